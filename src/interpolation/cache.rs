//! # Table Cache
//!
//! Interpolation tables are expensive to build, every node being a
//! numerical integral. A built table set is stored under a file name
//! derived from a SHA-256 fingerprint of every parameter that affects its
//! values, and reloaded on the next construction with the same setup.
//!
//! ## File Layout
//!
//! Text (`.txt`), whitespace separated, floats with 17 significant digits:
//!
//! ```text
//! LEPTOPROP-TABLES 1
//! fingerprint <hex>
//! tables <count>
//! table1d <nodes> <min> <max> <log> <order> <flags>
//! <value>...
//! table2d <n1> <min1> <max1> <log1> <n2> <min2> <max2> <log2> <order> <flags>
//! <value>...
//! checksum <sha256 of everything above>
//! ```
//!
//! Raw (`.bin`): the same fields little-endian, magic `LPTB`, the 32 byte
//! fingerprint, and the 32 byte SHA-256 of the preceding bytes at the end.
//!
//! Files are written to a temporary name and renamed into place, so
//! concurrent writers of one fingerprint resolve to the last rename and a
//! reader never observes a partial file under the final name. Anything
//! that fails validation is reported as [`CacheError`] and rebuilt.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{Axis, Interpolant1D, Interpolant2D, TableFlags, MAX_ORDER};

const TEXT_MAGIC: &str = "LEPTOPROP-TABLES";
const RAW_MAGIC: &[u8; 4] = b"LPTB";
const FORMAT_VERSION: u32 = 1;
const MAX_NODES: usize = 1 << 20;
const MAX_TABLES: usize = 1 << 12;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// ERRORS
// ============================================================================

/// Reasons a stored table set is rejected
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("table file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed table file: {0}")]
    Malformed(String),

    #[error("table file was built for a different configuration")]
    FingerprintMismatch,

    #[error("table file checksum mismatch")]
    ChecksumMismatch,

    #[error("inconsistent table: {0}")]
    Inconsistent(String),
}

fn malformed(what: impl Into<String>) -> CacheError {
    CacheError::Malformed(what.into())
}

// ============================================================================
// FINGERPRINTS
// ============================================================================

/// SHA-256 key of a table configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: [u8; 32],
}

impl Fingerprint {
    pub fn hex(&self) -> String {
        to_hex(&self.digest)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.digest
    }
}

/// Accumulates a canonical `key=value;` description and hashes it.
/// Floats enter by their bit pattern so the key is exact.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    canonical: String,
}

impl FingerprintBuilder {
    pub fn new(kind: &str) -> Self {
        Self { canonical: format!("kind={kind};") }
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.canonical.push_str(&format!("{key}={value};"));
        self
    }

    pub fn number(mut self, key: &str, value: f64) -> Self {
        self.canonical.push_str(&format!("{key}={:016x};", value.to_bits()));
        self
    }

    pub fn integer(mut self, key: &str, value: u64) -> Self {
        self.canonical.push_str(&format!("{key}={value};"));
        self
    }

    pub fn flag(mut self, key: &str, value: bool) -> Self {
        self.canonical.push_str(&format!("{key}={};", u8::from(value)));
        self
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn finish(&self) -> Fingerprint {
        let digest: [u8; 32] = Sha256::digest(self.canonical.as_bytes()).into();
        Fingerprint { digest }
    }
}

/// Types whose parameters change tabulated values
pub trait FingerprintSource {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder;
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// TABLE SETS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    One(Interpolant1D),
    Two(Interpolant2D),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    One,
    Two,
}

impl Table {
    pub fn kind(&self) -> TableKind {
        match self {
            Table::One(_) => TableKind::One,
            Table::Two(_) => TableKind::Two,
        }
    }
}

/// On-disk encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Text,
    Raw,
}

impl TableFormat {
    fn extension(&self) -> &'static str {
        match self {
            TableFormat::Text => "txt",
            TableFormat::Raw => "bin",
        }
    }
}

fn validate_axis(axis: &Axis) -> Result<(), CacheError> {
    if axis.nodes < 2 || axis.nodes > MAX_NODES {
        return Err(CacheError::Inconsistent(format!("node count {}", axis.nodes)));
    }
    if !axis.min.is_finite() || !axis.max.is_finite() || axis.min >= axis.max {
        return Err(CacheError::Inconsistent(format!("domain [{}, {}]", axis.min, axis.max)));
    }
    if axis.log && axis.min <= 0.0 {
        return Err(CacheError::Inconsistent("logarithmic axis with non-positive edge".into()));
    }
    Ok(())
}

fn validate_values(order: usize, min_nodes: usize, values: &[f64], expected: usize) -> Result<(), CacheError> {
    if order == 0 || order > MAX_ORDER || order > min_nodes {
        return Err(CacheError::Inconsistent(format!("interpolation order {order}")));
    }
    if values.len() != expected {
        return Err(CacheError::Inconsistent(format!(
            "{} values for {expected} nodes",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CacheError::Inconsistent("non-finite value".into()));
    }
    Ok(())
}

fn assemble_1d(axis: Axis, order: usize, bits: u8, values: Vec<f64>) -> Result<Table, CacheError> {
    validate_axis(&axis)?;
    validate_values(order, axis.nodes, &values, axis.nodes)?;
    let flags = TableFlags::from_bits(bits).ok_or_else(|| malformed("unknown flag bits"))?;
    Ok(Table::One(Interpolant1D::from_parts(axis, order, flags, values)))
}

fn assemble_2d(axis1: Axis, axis2: Axis, order: usize, bits: u8, values: Vec<f64>) -> Result<Table, CacheError> {
    validate_axis(&axis1)?;
    validate_axis(&axis2)?;
    validate_values(order, axis1.nodes.min(axis2.nodes), &values, axis1.nodes * axis2.nodes)?;
    let flags = TableFlags::from_bits(bits).ok_or_else(|| malformed("unknown flag bits"))?;
    Ok(Table::Two(Interpolant2D::from_parts(axis1, axis2, order, flags, values)))
}

// ============================================================================
// TEXT CODEC
// ============================================================================

fn push_float(out: &mut String, value: f64) {
    out.push_str(&format!("{value:.16e}\n"));
}

pub fn encode_text(fingerprint: &Fingerprint, tables: &[Table]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{TEXT_MAGIC} {FORMAT_VERSION}\n"));
    out.push_str(&format!("fingerprint {}\n", fingerprint.hex()));
    out.push_str(&format!("tables {}\n", tables.len()));

    for table in tables {
        match table {
            Table::One(t) => {
                let a = t.axis();
                out.push_str(&format!(
                    "table1d {} {:.16e} {:.16e} {} {} {}\n",
                    a.nodes,
                    a.min,
                    a.max,
                    u8::from(a.log),
                    t.order(),
                    t.flags().bits()
                ));
                for &v in t.stored_values() {
                    push_float(&mut out, v);
                }
            }
            Table::Two(t) => {
                let (a1, a2) = t.axes();
                out.push_str(&format!(
                    "table2d {} {:.16e} {:.16e} {} {} {:.16e} {:.16e} {} {} {}\n",
                    a1.nodes,
                    a1.min,
                    a1.max,
                    u8::from(a1.log),
                    a2.nodes,
                    a2.min,
                    a2.max,
                    u8::from(a2.log),
                    t.order(),
                    t.flags().bits()
                ));
                for &v in t.stored_values() {
                    push_float(&mut out, v);
                }
            }
        }
    }

    let checksum = to_hex(&Sha256::digest(out.as_bytes()));
    out.push_str(&format!("checksum {checksum}\n"));
    out
}

struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
    /// Upper bound on the tokens left, every token needs two bytes
    limit: usize,
}

impl<'a> Tokens<'a> {
    fn word(&mut self, what: &str) -> Result<&'a str, CacheError> {
        self.inner.next().ok_or_else(|| malformed(format!("missing {what}")))
    }

    fn expect(&mut self, literal: &str) -> Result<(), CacheError> {
        let word = self.word(literal)?;
        if word == literal {
            Ok(())
        } else {
            Err(malformed(format!("expected `{literal}`, found `{word}`")))
        }
    }

    fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, CacheError> {
        let word = self.word(what)?;
        word.parse().map_err(|_| malformed(format!("bad {what} `{word}`")))
    }

    fn axis(&mut self) -> Result<Axis, CacheError> {
        let nodes: usize = self.parse("node count")?;
        let min: f64 = self.parse("domain minimum")?;
        let max: f64 = self.parse("domain maximum")?;
        let log: u8 = self.parse("axis log flag")?;
        if log > 1 {
            return Err(malformed("axis log flag"));
        }
        Ok(Axis { min, max, nodes, log: log == 1 })
    }

    fn values(&mut self, count: usize) -> Result<Vec<f64>, CacheError> {
        if count > self.limit {
            return Err(malformed(format!("{count} values announced")));
        }
        (0..count).map(|_| self.parse("value")).collect()
    }
}

pub fn decode_text(bytes: &[u8], fingerprint: &Fingerprint) -> Result<Vec<Table>, CacheError> {
    let text = std::str::from_utf8(bytes).map_err(|_| malformed("not utf-8"))?;
    let split = text.rfind("checksum ").ok_or_else(|| malformed("missing checksum"))?;
    let (body, trailer) = text.split_at(split);
    let stored = trailer["checksum ".len()..].trim();
    if to_hex(&Sha256::digest(body.as_bytes())) != stored {
        return Err(CacheError::ChecksumMismatch);
    }

    let mut tokens = Tokens { inner: body.split_whitespace(), limit: body.len() / 2 + 1 };
    tokens.expect(TEXT_MAGIC)?;
    let version: u32 = tokens.parse("format version")?;
    if version != FORMAT_VERSION {
        return Err(malformed(format!("format version {version}")));
    }
    tokens.expect("fingerprint")?;
    if tokens.word("fingerprint")? != fingerprint.hex() {
        return Err(CacheError::FingerprintMismatch);
    }
    tokens.expect("tables")?;
    let count: usize = tokens.parse("table count")?;
    if count > MAX_TABLES {
        return Err(malformed(format!("table count {count}")));
    }

    let mut tables = Vec::with_capacity(count);
    for _ in 0..count {
        match tokens.word("table header")? {
            "table1d" => {
                let axis = tokens.axis()?;
                let order: usize = tokens.parse("order")?;
                let bits: u8 = tokens.parse("flags")?;
                validate_axis(&axis)?;
                let values = tokens.values(axis.nodes)?;
                tables.push(assemble_1d(axis, order, bits, values)?);
            }
            "table2d" => {
                let axis1 = tokens.axis()?;
                let axis2 = tokens.axis()?;
                let order: usize = tokens.parse("order")?;
                let bits: u8 = tokens.parse("flags")?;
                validate_axis(&axis1)?;
                validate_axis(&axis2)?;
                let values = tokens.values(axis1.nodes.saturating_mul(axis2.nodes))?;
                tables.push(assemble_2d(axis1, axis2, order, bits, values)?);
            }
            other => return Err(malformed(format!("unknown table kind `{other}`"))),
        }
    }

    if tokens.inner.next().is_some() {
        return Err(malformed("trailing data"));
    }
    Ok(tables)
}

// ============================================================================
// RAW CODEC
// ============================================================================

fn push_axis(out: &mut Vec<u8>, axis: &Axis) {
    out.extend_from_slice(&(axis.nodes as u64).to_le_bytes());
    out.extend_from_slice(&axis.min.to_le_bytes());
    out.extend_from_slice(&axis.max.to_le_bytes());
    out.push(u8::from(axis.log));
}

pub fn encode_raw(fingerprint: &Fingerprint, tables: &[Table]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(RAW_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(fingerprint.bytes());
    out.extend_from_slice(&(tables.len() as u32).to_le_bytes());

    for table in tables {
        match table {
            Table::One(t) => {
                out.push(1);
                push_axis(&mut out, t.axis());
                out.extend_from_slice(&(t.order() as u32).to_le_bytes());
                out.push(t.flags().bits());
                for v in t.stored_values() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Table::Two(t) => {
                out.push(2);
                let (a1, a2) = t.axes();
                push_axis(&mut out, a1);
                push_axis(&mut out, a2);
                out.extend_from_slice(&(t.order() as u32).to_le_bytes());
                out.push(t.flags().bits());
                for v in t.stored_values() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
    }

    let checksum = Sha256::digest(&out);
    out.extend_from_slice(&checksum);
    out
}

struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self.position.checked_add(n).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| malformed("truncated raw table"))?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CacheError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CacheError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CacheError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CacheError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CacheError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn axis(&mut self) -> Result<Axis, CacheError> {
        let nodes = usize::try_from(self.u64()?).map_err(|_| malformed("node count"))?;
        let min = self.f64()?;
        let max = self.f64()?;
        let log = match self.u8()? {
            0 => false,
            1 => true,
            _ => return Err(malformed("axis log flag")),
        };
        Ok(Axis { min, max, nodes, log })
    }

    fn values(&mut self, count: usize) -> Result<Vec<f64>, CacheError> {
        let remaining = self.data.len() - self.position;
        if count.checked_mul(8).map_or(true, |bytes| bytes > remaining) {
            return Err(malformed("truncated value grid"));
        }
        (0..count).map(|_| self.f64()).collect()
    }
}

pub fn decode_raw(bytes: &[u8], fingerprint: &Fingerprint) -> Result<Vec<Table>, CacheError> {
    if bytes.len() < RAW_MAGIC.len() + 4 + 32 + 4 + 32 {
        return Err(malformed("raw table file too short"));
    }
    let (body, stored) = bytes.split_at(bytes.len() - 32);
    if Sha256::digest(body).as_slice() != stored {
        return Err(CacheError::ChecksumMismatch);
    }

    let mut reader = ByteReader { data: body, position: 0 };
    if reader.take(RAW_MAGIC.len())? != RAW_MAGIC {
        return Err(malformed("bad magic"));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(malformed(format!("format version {version}")));
    }
    if reader.take(32)? != fingerprint.bytes() {
        return Err(CacheError::FingerprintMismatch);
    }
    let count = reader.u32()? as usize;
    if count > MAX_TABLES {
        return Err(malformed(format!("table count {count}")));
    }

    let mut tables = Vec::with_capacity(count);
    for _ in 0..count {
        match reader.u8()? {
            1 => {
                let axis = reader.axis()?;
                let order = reader.u32()? as usize;
                let bits = reader.u8()?;
                validate_axis(&axis)?;
                let values = reader.values(axis.nodes)?;
                tables.push(assemble_1d(axis, order, bits, values)?);
            }
            2 => {
                let axis1 = reader.axis()?;
                let axis2 = reader.axis()?;
                let order = reader.u32()? as usize;
                let bits = reader.u8()?;
                validate_axis(&axis1)?;
                validate_axis(&axis2)?;
                let values = reader.values(axis1.nodes.saturating_mul(axis2.nodes))?;
                tables.push(assemble_2d(axis1, axis2, order, bits, values)?);
            }
            other => return Err(malformed(format!("unknown table kind {other}"))),
        }
    }

    if reader.position != body.len() {
        return Err(malformed("trailing data"));
    }
    Ok(tables)
}

// ============================================================================
// STORE
// ============================================================================

/// Where and how table sets are persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStore {
    directory: Option<PathBuf>,
    format: TableFormat,
}

impl TableStore {
    /// Tables are rebuilt on every construction and never written
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn on_disk(directory: impl Into<PathBuf>, format: TableFormat) -> Self {
        Self { directory: Some(directory.into()), format }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    pub fn path_for(&self, label: &str, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let directory = self.directory.as_ref()?;
        let hex = fingerprint.hex();
        Some(directory.join(format!("{label}_{}.{}", &hex[..32], self.format.extension())))
    }

    /// Load the table set for `fingerprint`, or build and persist it
    pub fn load_or_build<F>(
        &self,
        label: &str,
        fingerprint: &Fingerprint,
        layout: &[TableKind],
        build: F,
    ) -> Vec<Table>
    where
        F: FnOnce() -> Vec<Table>,
    {
        let Some(path) = self.path_for(label, fingerprint) else {
            info!(label, "building interpolation tables in memory");
            return build();
        };

        if path.exists() {
            match self.load(&path, fingerprint, layout) {
                Ok(tables) => {
                    info!(label, path = %path.display(), "loaded interpolation tables");
                    return tables;
                }
                Err(err) => {
                    warn!(label, path = %path.display(), error = %err, "interpolation tables corrupted, rebuilding");
                }
            }
        }

        info!(label, path = %path.display(), "building interpolation tables");
        let tables = build();
        match self.save(&path, fingerprint, &tables) {
            Ok(()) => info!(label, path = %path.display(), "saved interpolation tables"),
            Err(err) => warn!(label, path = %path.display(), error = %err, "could not save interpolation tables"),
        }
        tables
    }

    pub fn load(&self, path: &Path, fingerprint: &Fingerprint, layout: &[TableKind]) -> Result<Vec<Table>, CacheError> {
        let bytes = fs::read(path)?;
        let tables = match self.format {
            TableFormat::Text => decode_text(&bytes, fingerprint)?,
            TableFormat::Raw => decode_raw(&bytes, fingerprint)?,
        };
        let kinds: Vec<TableKind> = tables.iter().map(Table::kind).collect();
        if kinds != layout {
            return Err(CacheError::Inconsistent(format!(
                "expected {} tables of layout {:?}, found {:?}",
                layout.len(),
                layout,
                kinds
            )));
        }
        Ok(tables)
    }

    pub fn save(&self, path: &Path, fingerprint: &Fingerprint, tables: &[Table]) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = match self.format {
            TableFormat::Text => encode_text(fingerprint, tables).into_bytes(),
            TableFormat::Raw => encode_raw(fingerprint, tables),
        };

        let temp = temp_path(path);
        fs::write(&temp, &bytes)?;
        if let Err(err) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    path.with_file_name(name)
}
