//! Unit inventories for the two synthesis back ends.
//!
//! Two on-disk formats are supported:
//!   - a binary diphone dump: header, then one record per unit, either a
//!     plain diphone (pitch-period frames of 16-bit LE samples around a
//!     midpoint) or an alias referring to an earlier plain record by name
//!   - a text cluster-unit catalog: scoring weights, `SAMPLE_INFO`, an `STS`
//!     frame table, `UNITS` lines indexing into it, and per-type `CART`
//!     blocks; `***` lines are comments

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cart::Cart;

// ─────────────────────────────────────────────────────────────────────────────
// Shared acoustic records
// ─────────────────────────────────────────────────────────────────────────────

/// Global audio parameters of a unit inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInfo {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub lpc_min: f32,
    pub lpc_range: f32,
}

impl Default for SampleInfo {
    fn default() -> Self {
        SampleInfo {
            sample_rate: 16000,
            num_channels: 1,
            lpc_min: 0.0,
            lpc_range: 1.0,
        }
    }
}

/// One short-term frame: spectral parameters plus excitation residual.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub params: Vec<i16>,
    pub residual: Vec<i16>,
}

impl Frame {
    /// Weighted L1 distance between the parameter tracks of two frames.
    /// Weights are 16.16-style fixed point, so 65536 means 1.0.
    pub fn param_distance(&self, other: &Frame, weights: &[u32]) -> f32 {
        let mut cost = 0.0f32;
        for (i, (a, b)) in self.params.iter().zip(&other.params).enumerate() {
            let w = weights.get(i).copied().unwrap_or(65536) as f32 / 65536.0;
            cost += (*a as f32 - *b as f32).abs() * w;
        }
        cost
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binary diphone dump
// ─────────────────────────────────────────────────────────────────────────────

const DB_MAGIC: u32 = 0x5556_4442; // "UVDB"
const DB_VERSION: u32 = 1;
const PLAIN_MAGIC: u32 = 0x5556_4e31; // "UVN1"
const ALIAS_MAGIC: u32 = 0x5556_4e32; // "UVN2"
const NAME_LENGTH: usize = 8;

/// One diphone: pitch-period frames of raw samples, split at `midpoint`
/// into the trailing half of the first phone and the leading half of the
/// second.
#[derive(Debug, Clone, PartialEq)]
pub struct Diphone {
    pub name: String,
    pub midpoint: usize,
    pub frames: Vec<Vec<i16>>,
}

impl Diphone {
    pub fn total_samples(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }
}

/// In-memory diphone inventory, addressable by `last-this` unit name.
/// Aliases resolve to their original at registration time, so lookups by an
/// alias name return the original's frames.
#[derive(Debug)]
pub struct DiphoneUnitDatabase {
    sample_rate: u32,
    diphones: Vec<Diphone>,
    index: HashMap<String, usize>,
    aliases: Vec<(String, String)>,
}

impl DiphoneUnitDatabase {
    /// Register plain diphones and `(alias, original)` pairs.
    ///
    /// Alias registration re-checks the recorded original name against the
    /// name stored on the resolved diphone and fails on any drift; an alias
    /// pointing at another alias is rejected.
    pub fn from_units(
        sample_rate: u32,
        diphones: Vec<Diphone>,
        aliases: Vec<(String, String)>,
    ) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, d) in diphones.iter().enumerate() {
            if index.insert(d.name.trim_end().to_string(), i).is_some() {
                bail!("duplicate diphone '{}'", d.name.trim_end());
            }
        }
        let alias_names: Vec<&str> = aliases.iter().map(|(a, _)| a.as_str()).collect();
        for (alias, original) in &aliases {
            if alias_names.contains(&original.as_str()) {
                bail!("alias '{}' refers to another alias '{}'", alias, original);
            }
            let idx = *index
                .get(original.trim_end())
                .with_context(|| format!("alias '{}' refers to unknown diphone '{}'", alias, original))?;
            if diphones[idx].name != *original {
                bail!(
                    "alias '{}' recorded original '{}' but resolved '{}'",
                    alias,
                    original,
                    diphones[idx].name
                );
            }
            if index.insert(alias.trim_end().to_string(), idx).is_some() {
                bail!("duplicate diphone '{}'", alias.trim_end());
            }
        }
        Ok(DiphoneUnitDatabase {
            sample_rate,
            diphones,
            index,
            aliases,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of distinct (non-alias) diphones.
    pub fn len(&self) -> usize {
        self.diphones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diphones.is_empty()
    }

    pub fn unit(&self, name: &str) -> Option<&Diphone> {
        self.index.get(name).map(|&i| &self.diphones[i])
    }

    /// Read a binary dump.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = read_u32(r).context("diphone database truncated in header")?;
        if magic != DB_MAGIC {
            bail!("not a diphone database (bad magic 0x{:08x})", magic);
        }
        let version = read_u32(r)?;
        if version != DB_VERSION {
            bail!("unsupported diphone database version {}", version);
        }
        let sample_rate = read_u32(r)?;
        let count = read_u32(r)?;

        let mut diphones = Vec::new();
        let mut aliases = Vec::new();
        for i in 0..count {
            let record = read_u32(r).with_context(|| format!("record {} truncated", i))?;
            match record {
                PLAIN_MAGIC => {
                    let name = read_name(r)?;
                    let midpoint = read_u32(r)? as usize;
                    let frame_count = read_u32(r)? as usize;
                    let frame_size = read_u32(r)? as usize;
                    if midpoint > frame_count {
                        bail!(
                            "diphone '{}': midpoint {} past frame count {}",
                            name,
                            midpoint,
                            frame_count
                        );
                    }
                    let mut frames = Vec::with_capacity(frame_count);
                    for _ in 0..frame_count {
                        let mut frame = Vec::with_capacity(frame_size);
                        for _ in 0..frame_size {
                            frame.push(read_i16(r)?);
                        }
                        frames.push(frame);
                    }
                    diphones.push(Diphone {
                        name,
                        midpoint,
                        frames,
                    });
                }
                ALIAS_MAGIC => {
                    let alias = read_name(r)?;
                    let original = read_name(r)?;
                    aliases.push((alias, original));
                }
                other => bail!("record {}: unknown record magic 0x{:08x}", i, other),
            }
        }
        Self::from_units(sample_rate, diphones, aliases)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path)
            .with_context(|| format!("Cannot open diphone database: {}", path.display()))?;
        Self::parse(&mut file)
            .with_context(|| format!("Failed to parse diphone database: {}", path.display()))
    }

    /// Write the binary dump (plain records first, then aliases).
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, DB_MAGIC)?;
        write_u32(w, DB_VERSION)?;
        write_u32(w, self.sample_rate)?;
        write_u32(w, (self.diphones.len() + self.aliases.len()) as u32)?;
        for d in &self.diphones {
            let frame_size = d.frames.first().map(|f| f.len()).unwrap_or(0);
            if d.frames.iter().any(|f| f.len() != frame_size) {
                bail!("diphone '{}' has ragged frames", d.name);
            }
            write_u32(w, PLAIN_MAGIC)?;
            write_name(w, &d.name)?;
            write_u32(w, d.midpoint as u32)?;
            write_u32(w, d.frames.len() as u32)?;
            write_u32(w, frame_size as u32)?;
            for frame in &d.frames {
                for &sample in frame {
                    w.write_all(&sample.to_le_bytes())?;
                }
            }
        }
        for (alias, original) in &self.aliases {
            write_u32(w, ALIAS_MAGIC)?;
            write_name(w, alias)?;
            write_name(w, original)?;
        }
        Ok(())
    }
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i16<R: Read>(r: &mut R) -> std::io::Result<i16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

fn read_name<R: Read>(r: &mut R) -> Result<String> {
    let mut buf = [0u8; NAME_LENGTH];
    r.read_exact(&mut buf).context("unit name truncated")?;
    if !buf.is_ascii() {
        bail!("unit name is not ASCII");
    }
    let name = std::str::from_utf8(&buf)?.trim_end_matches(' ');
    Ok(name.to_string())
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_name<W: Write>(w: &mut W, name: &str) -> Result<()> {
    if name.len() > NAME_LENGTH || !name.is_ascii() {
        bail!("unit name '{}' does not fit {} ASCII bytes", name, NAME_LENGTH);
    }
    let mut buf = [b' '; NAME_LENGTH];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    w.write_all(&buf)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Text cluster-unit catalog
// ─────────────────────────────────────────────────────────────────────────────

/// `prev`/`next` sentinel in `UNITS` lines.
const NO_UNIT: usize = 65535;

/// One corpus occurrence: a span of STS frames plus its corpus neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterUnit {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// Strip the trailing `_<occurrence>` from a unit name, leaving its type.
pub fn unit_type(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((ty, occ)) if !occ.is_empty() && occ.bytes().all(|b| b.is_ascii_digit()) => ty,
        _ => name,
    }
}

/// Cluster-unit inventory: frames, units over them, per-type candidate
/// lists in corpus order, and the selection CARTs.
#[derive(Debug)]
pub struct ClusterUnitDatabase {
    continuity_weight: u32,
    optimal_coupling: u32,
    extend_selections: u32,
    join_method: u32,
    join_weights: Vec<u32>,
    sample_info: SampleInfo,
    frames: Vec<Frame>,
    units: Vec<ClusterUnit>,
    types: HashMap<String, Vec<usize>>,
    carts: HashMap<String, Cart>,
}

impl ClusterUnitDatabase {
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with("***"))
            .collect();

        let mut db = ClusterUnitDatabase {
            continuity_weight: 1,
            optimal_coupling: 0,
            extend_selections: 0,
            join_method: 0,
            join_weights: Vec::new(),
            sample_info: SampleInfo::default(),
            frames: Vec::new(),
            units: Vec::new(),
            types: HashMap::new(),
            carts: HashMap::new(),
        };

        let mut pos = 0;
        while pos < lines.len() {
            let (lineno, line) = lines[pos];
            pos += 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields[0] {
                "CONTINUITY_WEIGHT" => db.continuity_weight = parse_field(&fields, 1, lineno)?,
                "OPTIMAL_COUPLING" => db.optimal_coupling = parse_field(&fields, 1, lineno)?,
                "EXTEND_SELECTIONS" => db.extend_selections = parse_field(&fields, 1, lineno)?,
                "JOIN_METHOD" => db.join_method = parse_field(&fields, 1, lineno)?,
                "JOIN_WEIGHTS" => {
                    let k: usize = parse_field(&fields, 1, lineno)?;
                    if fields.len() != k + 2 {
                        bail!("line {}: JOIN_WEIGHTS announced {} weights, got {}", lineno, k, fields.len() - 2);
                    }
                    db.join_weights = fields[2..]
                        .iter()
                        .map(|f| f.parse::<u32>())
                        .collect::<std::result::Result<_, _>>()
                        .with_context(|| format!("line {}: bad JOIN_WEIGHTS", lineno))?;
                }
                "SAMPLE_INFO" => {
                    if fields.len() != 5 {
                        bail!("line {}: SAMPLE_INFO wants rate channels lpc_min lpc_range", lineno);
                    }
                    db.sample_info = SampleInfo {
                        sample_rate: parse_field(&fields, 1, lineno)?,
                        num_channels: parse_field(&fields, 2, lineno)?,
                        lpc_min: parse_field(&fields, 3, lineno)?,
                        lpc_range: parse_field(&fields, 4, lineno)?,
                    };
                }
                "STS" => {
                    let n: usize = parse_field(&fields, 1, lineno)?;
                    for _ in 0..n {
                        let (fl, frame_line) = *lines
                            .get(pos)
                            .with_context(|| format!("line {}: STS table truncated", lineno))?;
                        pos += 1;
                        db.frames.push(parse_frame(frame_line, fl)?);
                    }
                }
                "UNITS" => {
                    if fields.len() != 6 {
                        bail!("line {}: UNITS wants name start end prev next", lineno);
                    }
                    let start: usize = parse_field(&fields, 2, lineno)?;
                    let end: usize = parse_field(&fields, 3, lineno)?;
                    if end < start {
                        bail!("line {}: unit '{}' ends before it starts", lineno, fields[1]);
                    }
                    let prev: usize = parse_field(&fields, 4, lineno)?;
                    let next: usize = parse_field(&fields, 5, lineno)?;
                    db.units.push(ClusterUnit {
                        name: fields[1].to_string(),
                        start,
                        end,
                        prev: (prev != NO_UNIT).then_some(prev),
                        next: (next != NO_UNIT).then_some(next),
                    });
                }
                "CART" => {
                    let name = *fields
                        .get(1)
                        .with_context(|| format!("line {}: CART wants name and line count", lineno))?;
                    let n: usize = parse_field(&fields, 2, lineno)?;
                    let mut body = String::new();
                    for _ in 0..n {
                        let (_, cart_line) = *lines
                            .get(pos)
                            .with_context(|| format!("line {}: CART '{}' truncated", lineno, name))?;
                        pos += 1;
                        body.push_str(cart_line);
                        body.push('\n');
                    }
                    let cart = Cart::parse(&body)
                        .with_context(|| format!("line {}: bad CART '{}'", lineno, name))?;
                    db.carts.insert(name.to_string(), cart);
                }
                other => bail!("line {}: unknown tag '{}'", lineno, other),
            }
        }

        for (i, unit) in db.units.iter().enumerate() {
            if unit.end > db.frames.len() {
                bail!(
                    "unit '{}' spans frames {}..{} but the STS table has {}",
                    unit.name,
                    unit.start,
                    unit.end,
                    db.frames.len()
                );
            }
            if let Some(p) = unit.prev {
                if p >= db.units.len() {
                    bail!("unit '{}' prev {} out of range", unit.name, p);
                }
            }
            if let Some(n) = unit.next {
                if n >= db.units.len() {
                    bail!("unit '{}' next {} out of range", unit.name, n);
                }
            }
            db.types.entry(unit_type(&unit.name).to_string()).or_default().push(i);
        }
        Ok(db)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot open unit catalog: {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Failed to parse unit catalog: {}", path.display()))
    }

    pub fn sample_info(&self) -> &SampleInfo {
        &self.sample_info
    }

    pub fn continuity_weight(&self) -> u32 {
        self.continuity_weight
    }

    pub fn optimal_coupling(&self) -> u32 {
        self.optimal_coupling
    }

    pub fn extend_selections(&self) -> u32 {
        self.extend_selections
    }

    pub fn join_method(&self) -> u32 {
        self.join_method
    }

    pub fn join_weights(&self) -> &[u32] {
        &self.join_weights
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, index: usize) -> Option<&ClusterUnit> {
        self.units.get(index)
    }

    /// Candidate units of a type, in corpus order.
    pub fn units_of_type(&self, ty: &str) -> &[usize] {
        self.types.get(ty).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn cart(&self, name: &str) -> Option<&Cart> {
        self.carts.get(name)
    }

    pub fn unit_frames(&self, index: usize) -> &[Frame] {
        let unit = &self.units[index];
        &self.frames[unit.start..unit.end]
    }

    /// Whether two units sit next to each other in the recorded corpus.
    pub fn adjacent_in_corpus(&self, left: usize, right: usize) -> bool {
        self.units[left].next == Some(right)
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize, lineno: usize) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = fields
        .get(index)
        .with_context(|| format!("line {}: missing field {}", lineno, index))?;
    raw.parse::<T>()
        .with_context(|| format!("line {}: bad field '{}'", lineno, raw))
}

fn parse_frame(line: &str, lineno: usize) -> Result<Frame> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.first() != Some(&"FRAME") {
        bail!("line {}: expected FRAME, got '{}'", lineno, line);
    }
    let residual_at = fields
        .iter()
        .position(|f| *f == "RESIDUAL")
        .with_context(|| format!("line {}: FRAME without RESIDUAL", lineno))?;
    let params = fields[1..residual_at]
        .iter()
        .map(|f| f.parse::<i16>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("line {}: bad FRAME params", lineno))?;
    let m: usize = parse_field(&fields, residual_at + 1, lineno)?;
    let residual = fields[residual_at + 2..]
        .iter()
        .map(|f| f.parse::<i16>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("line {}: bad RESIDUAL samples", lineno))?;
    if residual.len() != m {
        bail!("line {}: RESIDUAL announced {} samples, got {}", lineno, m, residual.len());
    }
    Ok(Frame { params, residual })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A diphone with deterministic ramp samples derived from its name.
    pub fn make_diphone(name: &str, frame_count: usize) -> Diphone {
        let seed = name.bytes().map(|b| b as i16).sum::<i16>() % 100;
        let frames = (0..frame_count)
            .map(|f| (0..8).map(|s| seed + (f * 8 + s) as i16).collect())
            .collect();
        Diphone {
            name: name.to_string(),
            midpoint: frame_count / 2,
            frames,
        }
    }

    pub fn make_diphone_db(names: &[&str]) -> DiphoneUnitDatabase {
        let diphones = names.iter().map(|n| make_diphone(n, 4)).collect();
        DiphoneUnitDatabase::from_units(16000, diphones, Vec::new()).unwrap()
    }
}
