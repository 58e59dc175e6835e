//! Binary state streams
//!
//! A stream holds every live object, its script retain count, its tag and its
//! items, plus the database root. Edges are stored as handles, so shared and
//! cyclic structure survives a save/load without path bookkeeping.
//!
//! ```text
//! header   "QBST" u32:version              (absent in headerless streams)
//! body     u32:root u32:count object*
//! object   u32:handle u8:kind u32:external [tag] u32:items item*
//! tag      u8:present [u32:len bytes]       (version 2 and later)
//! item     [key] value
//! key      string (map) | u32 (form map) | i32 (int map) | nothing (array)
//! value    u8:type payload
//! ```
//!
//! All integers are little-endian. Reading is done in full before any state
//! is touched: a malformed stream leaves the runtime as it was.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::error::{QuickbeamError, Result};
use crate::object::{Contents, MapKey, Object, ObjectKind};
use crate::registry::Handle;
use crate::runtime::Runtime;
use crate::value::{FormId, Value};

/// First four bytes of a stream with a header
pub const MAGIC: [u8; 4] = *b"QBST";

/// Version written by this build
pub const CURRENT_VERSION: u32 = 2;

/// First version that stores object tags
const TAGS_SINCE: u32 = 2;

/// Cap on up-front allocation driven by counts read from the stream
const MAX_PREALLOC: usize = 1024;

/// How to interpret the start of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamVersion {
    /// Legacy stream: no header, version 1 body
    NoHeader,
    /// Magic and version header, as written by [`Runtime::write_state`]
    #[default]
    Current,
}

const TYPE_NONE: u8 = 0;
const TYPE_INT: u8 = 1;
const TYPE_FLOAT: u8 = 2;
const TYPE_STRING: u8 = 3;
const TYPE_FORM: u8 = 4;
const TYPE_OBJECT: u8 = 5;

// ═══════════════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════════════

struct Encoder<W> {
    out: W,
}

impl<W: Write> Encoder<W> {
    fn u8(&mut self, v: u8) -> Result<()> {
        self.out.write_all(&[v])?;
        Ok(())
    }

    fn u32(&mut self, v: u32) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn i32(&mut self, v: i32) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn len(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "length exceeds u32")
        })?;
        self.u32(n)
    }

    fn string(&mut self, s: &str) -> Result<()> {
        self.len(s.len())?;
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::None => self.u8(TYPE_NONE),
            Value::Int(n) => {
                self.u8(TYPE_INT)?;
                self.i32(*n)
            }
            Value::Float(x) => {
                self.u8(TYPE_FLOAT)?;
                self.u32(x.to_bits())
            }
            Value::String(s) => {
                self.u8(TYPE_STRING)?;
                self.string(s)
            }
            Value::Form(id) => {
                self.u8(TYPE_FORM)?;
                self.u32(id.raw())
            }
            Value::Object(edge) => match edge.upgrade() {
                Some(target) => {
                    self.u8(TYPE_OBJECT)?;
                    self.u32(target.handle().raw())
                }
                None => self.u8(TYPE_NONE),
            },
        }
    }

    fn object(&mut self, obj: &Object) -> Result<()> {
        let (contents, tag) = {
            let state = obj.lock();
            (state.contents.clone(), state.tag.clone())
        };
        self.u32(obj.handle().raw())?;
        self.u8(obj.kind().code())?;
        self.u32(obj.external_count())?;
        match &tag {
            Some(tag) => {
                self.u8(1)?;
                self.string(tag)?;
            }
            None => self.u8(0)?,
        }
        self.len(contents.len())?;
        match &contents {
            Contents::Array(items) => {
                for item in items {
                    self.value(item)?;
                }
            }
            Contents::Map(map) => {
                for (key, item) in map {
                    self.string(key.as_str())?;
                    self.value(item)?;
                }
            }
            Contents::FormMap(map) => {
                for (id, item) in map {
                    self.u32(id.raw())?;
                    self.value(item)?;
                }
            }
            Contents::IntMap(map) => {
                for (key, item) in map {
                    self.i32(*key)?;
                    self.value(item)?;
                }
            }
        }
        Ok(())
    }
}

/// Write the header and every live object of `runtime`.
pub(crate) fn write_state(runtime: &Runtime, out: impl Write) -> Result<()> {
    let mut enc = Encoder { out };
    let objects = runtime.objects_matching(|_| true);
    let root = runtime.database_handle().map_or(0, Handle::raw);

    enc.out.write_all(&MAGIC)?;
    enc.u32(CURRENT_VERSION)?;
    enc.u32(root)?;
    enc.len(objects.len())?;
    for obj in &objects {
        enc.object(obj)?;
    }
    enc.out.flush()?;
    debug!("wrote {} objects, database root #{}", objects.len(), root);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════════════

enum RawValue {
    Plain(Value),
    Edge(u32),
}

enum RawItems {
    Array(Vec<RawValue>),
    Map(Vec<(String, RawValue)>),
    FormMap(Vec<(FormId, RawValue)>),
    IntMap(Vec<(i32, RawValue)>),
}

struct Record {
    handle: u32,
    kind: ObjectKind,
    external: u32,
    tag: Option<String>,
    items: RawItems,
}

struct Decoder<R> {
    input: R,
}

impl<R: Read> Decoder<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.input.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = u64::from(self.u32()?);
        let mut buf = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
        let read = (&mut self.input).take(len).read_to_end(&mut buf)?;
        if (read as u64) < len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        String::from_utf8(buf).map_err(|_| QuickbeamError::InvalidUtf8)
    }

    fn value(&mut self) -> Result<RawValue> {
        let value = match self.u8()? {
            TYPE_NONE => Value::None,
            TYPE_INT => Value::Int(self.i32()?),
            TYPE_FLOAT => Value::Float(f32::from_bits(self.u32()?)),
            TYPE_STRING => Value::string(self.string()?),
            TYPE_FORM => Value::form(FormId(self.u32()?)),
            TYPE_OBJECT => return Ok(RawValue::Edge(self.u32()?)),
            other => return Err(QuickbeamError::UnknownValueTag(other)),
        };
        Ok(RawValue::Plain(value))
    }

    fn items<K>(
        &mut self,
        count: u32,
        mut key: impl FnMut(&mut Self) -> Result<K>,
    ) -> Result<Vec<(K, RawValue)>> {
        let mut items = Vec::with_capacity((count as usize).min(MAX_PREALLOC));
        for _ in 0..count {
            let k = key(self)?;
            items.push((k, self.value()?));
        }
        Ok(items)
    }

    fn record(&mut self, version: u32) -> Result<Record> {
        let handle = self.u32()?;
        let code = self.u8()?;
        let kind = ObjectKind::from_code(code).ok_or(QuickbeamError::UnknownKind(code))?;
        let external = self.u32()?;
        let tag = if version >= TAGS_SINCE && self.u8()? != 0 {
            Some(self.string()?)
        } else {
            None
        };
        let count = self.u32()?;
        let items = match kind {
            ObjectKind::Array => {
                let mut values = Vec::with_capacity((count as usize).min(MAX_PREALLOC));
                for _ in 0..count {
                    values.push(self.value()?);
                }
                RawItems::Array(values)
            }
            ObjectKind::Map => RawItems::Map(self.items(count, Self::string)?),
            ObjectKind::FormMap => {
                RawItems::FormMap(self.items(count, |d| d.u32().map(FormId))?)
            }
            ObjectKind::IntMap => RawItems::IntMap(self.items(count, Self::i32)?),
        };
        Ok(Record {
            handle,
            kind,
            external,
            tag,
            items,
        })
    }
}

/// A fully parsed stream, not yet applied.
struct Image {
    root: u32,
    records: Vec<Record>,
}

fn parse(input: impl Read, start: StreamVersion) -> Result<Image> {
    let mut dec = Decoder { input };
    let version = match start {
        StreamVersion::NoHeader => 1,
        StreamVersion::Current => {
            let magic = dec.bytes::<4>()?;
            if magic != MAGIC {
                return Err(QuickbeamError::BadMagic { found: magic });
            }
            let version = dec.u32()?;
            if version == 0 || version > CURRENT_VERSION {
                return Err(QuickbeamError::UnsupportedVersion(version));
            }
            version
        }
    };

    let root = dec.u32()?;
    let count = dec.u32()?;
    let mut records = Vec::with_capacity((count as usize).min(MAX_PREALLOC));
    let mut seen = HashSet::new();
    for _ in 0..count {
        let record = dec.record(version)?;
        if record.handle == 0 || !seen.insert(record.handle) {
            return Err(QuickbeamError::DuplicateHandle(record.handle));
        }
        records.push(record);
    }
    if root != 0 && !seen.contains(&root) {
        return Err(QuickbeamError::BadRoot(root));
    }
    Ok(Image { root, records })
}

fn link(raw: RawValue, objects: &HashMap<u32, Arc<Object>>) -> Value {
    match raw {
        RawValue::Plain(value) => value,
        RawValue::Edge(handle) => match objects.get(&handle) {
            Some(target) => Value::object(target),
            None => {
                warn!("stream edge to missing object #{}", handle);
                Value::None
            }
        },
    }
}

fn build_contents(items: RawItems, objects: &HashMap<u32, Arc<Object>>) -> Contents {
    match items {
        RawItems::Array(values) => {
            Contents::Array(values.into_iter().map(|v| link(v, objects)).collect())
        }
        RawItems::Map(pairs) => Contents::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (MapKey::from(k), link(v, objects)))
                .collect::<IndexMap<_, _>>(),
        ),
        RawItems::FormMap(pairs) => Contents::FormMap(
            pairs
                .into_iter()
                .filter(|(id, _)| !id.is_zero())
                .map(|(id, v)| (id, link(v, objects)))
                .collect::<BTreeMap<_, _>>(),
        ),
        RawItems::IntMap(pairs) => Contents::IntMap(
            pairs
                .into_iter()
                .map(|(k, v)| (k, link(v, objects)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Replace the whole state of `runtime` with the one in `input`.
///
/// On error nothing is changed. On success every previous object is gone,
/// handles, retain counts and tags are those of the stream, and each
/// restored object gets a fresh autorelease claim.
pub(crate) fn read_state(runtime: &Runtime, input: impl Read, start: StreamVersion) -> Result<()> {
    let image = parse(input, start)?;
    runtime.clear_state();

    let mut objects = HashMap::with_capacity(image.records.len());
    for record in &image.records {
        match runtime.restore_object(Handle(record.handle), record.kind) {
            Some(obj) => {
                // Claimed before any edge exists, so linking cannot kill it
                runtime.grant_grace(&obj);
                objects.insert(record.handle, obj);
            }
            None => warn!("handle #{} already in use, object skipped", record.handle),
        }
    }

    for record in image.records {
        let Some(obj) = objects.get(&record.handle) else {
            continue;
        };
        obj.counts.add_external(record.external);
        obj.set_tag(record.tag.as_deref());
        obj.replace_contents(build_contents(record.items, &objects));
    }

    let root = objects.get(&image.root);
    runtime.set_database(root);
    debug!(
        "restored {} objects, database root #{}",
        objects.len(),
        image.root
    );
    Ok(())
}
