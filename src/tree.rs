//! The field-set driver: an arena of field sets, driven lazily.
//!
//! Spec models a field set as both "a field" (has an address/size/parent)
//! and "a producer-driven container" at once, with a child holding a weak
//! back-reference to its parent. Rust has no cheap, safe way to share that
//! cycle through owned references, so this core takes the redesign spec §9
//! prescribes: one arena (`Vec<FieldSetSlot>`) holds every field set in the
//! document, indices (`FieldSetId`) are the non-owning back-pointers, and
//! `FieldTree` is the single `&mut` entry point that performs every lazy
//! pull. Leaves never get their own arena slot — they live directly inside
//! their parent's [`crate::ordered_map::OrderedUniqueMap`] as [`FieldNode`]s.

use std::collections::HashMap;

use crate::endian::Endian;
use crate::error::{CoreError, Result};
use crate::event::{Event, EventHandler, EventKind};
use crate::field::LeafKind;
use crate::ordered_map::OrderedUniqueMap;
use crate::producer::{FieldPayload, FieldSpec, Producer};
use crate::config::ParserOptions;
use crate::stream::InputStream;
use crate::value::Value;

/// Arena index of a field set. `FieldSetId(0)` is always the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSetId(pub(crate) u32);

/// A location a consumer has resolved, either by path or during traversal:
/// either a nested field set, or a leaf living at `index` inside `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    Set(FieldSetId),
    Child { parent: FieldSetId, index: usize },
}

/// A materialized child: either a leaf or a nested field set (by arena id).
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub name: String,
    pub address: u64,
    pub description: Option<String>,
    pub endian: Endian,
    pub content: FieldContent,
}

#[derive(Debug, Clone)]
pub enum FieldContent {
    Leaf { kind: LeafKind, size_bits: u64 },
    Set(FieldSetId),
}

struct FieldSetSlot {
    parent: Option<FieldSetId>,
    name: String,
    address: u64,
    description: Option<String>,
    endian: Endian,
    own_size: Option<u64>,
    current_size: u64,
    fields: OrderedUniqueMap<FieldNode>,
    producer: Box<dyn Producer>,
    sealed: bool,
    array_counters: HashMap<String, u32>,
    local_events: Option<EventHandler>,
}

/// A producer that must never actually run; used only as a placeholder
/// while a slot's real producer is briefly taken out to satisfy the borrow
/// checker during a pull.
struct NullProducer;
impl Producer for NullProducer {
    fn next(&mut self, _tree: &FieldTree, _set: FieldSetId) -> Result<Option<FieldSpec>> {
        unreachable!("NullProducer must never be invoked")
    }
}

/// Owns the whole parsed document: the backing stream and every field set
/// materialized so far.
pub struct FieldTree {
    stream: InputStream,
    options: ParserOptions,
    arena: Vec<FieldSetSlot>,
    global_events: Option<EventHandler>,
}

impl FieldTree {
    /// Build a tree with a fresh root field set.
    pub fn new(
        stream: InputStream,
        options: ParserOptions,
        name: impl Into<String>,
        description: Option<String>,
        endian: Endian,
        producer: Box<dyn Producer>,
        size_bits: Option<u64>,
    ) -> Self {
        let root = FieldSetSlot {
            parent: None,
            name: name.into(),
            address: 0,
            description,
            endian,
            own_size: size_bits,
            current_size: 0,
            fields: OrderedUniqueMap::new(),
            producer,
            sealed: false,
            array_counters: HashMap::new(),
            local_events: None,
        };
        FieldTree { stream, options, arena: vec![root], global_events: None }
    }

    pub fn root(&self) -> FieldSetId {
        FieldSetId(0)
    }

    pub fn stream(&self) -> &InputStream {
        &self.stream
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    // ---- geometry -------------------------------------------------

    pub fn absolute_address(&self, set: FieldSetId) -> u64 {
        let mut addr = 0u64;
        let mut current = Some(set);
        while let Some(id) = current {
            let slot = &self.arena[id.0 as usize];
            addr += slot.address;
            current = slot.parent;
        }
        addr
    }

    pub fn path_of_set(&self, set: FieldSetId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(set);
        while let Some(id) = current {
            let slot = &self.arena[id.0 as usize];
            parts.push(slot.name.clone());
            current = slot.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    pub fn current_size(&self, set: FieldSetId) -> u64 {
        self.arena[set.0 as usize].current_size
    }

    pub fn declared_size(&self, set: FieldSetId) -> Option<u64> {
        self.arena[set.0 as usize].own_size
    }

    pub fn done(&self, set: FieldSetId) -> bool {
        self.arena[set.0 as usize].sealed
    }

    pub fn endian_of(&self, set: FieldSetId) -> Endian {
        self.arena[set.0 as usize].endian
    }

    pub fn len(&self, set: FieldSetId) -> usize {
        self.arena[set.0 as usize].fields.len()
    }

    /// Walk the ancestor chain for the first field set (or the stream
    /// itself) with a known size, translating `extra_bits` into its
    /// coordinate system and returning the remaining room (possibly
    /// negative). `None` only if the root's size is unknown *and* the
    /// stream's size is unknown, which cannot happen for the in-memory
    /// streams this core constructs.
    fn check_size(&self, set: FieldSetId, extra_bits: u64) -> Option<i64> {
        let mut current = set;
        let mut size = extra_bits;
        loop {
            let slot = &self.arena[current.0 as usize];
            if let Some(known) = slot.own_size {
                return Some(known as i64 - size as i64);
            }
            match slot.parent {
                Some(parent) => {
                    size += slot.address;
                    current = parent;
                }
                None => return self.stream.size().map(|stream_size| stream_size as i64 - size as i64),
            }
        }
    }

    /// True once one more bit would already exceed the declared or
    /// inferred cap for `set`.
    pub fn eof(&self, set: FieldSetId) -> bool {
        let current_size = self.arena[set.0 as usize].current_size;
        self.check_size(set, current_size + 1).map(|r| r < 0).unwrap_or(false)
    }

    /// Convenience for producers: the absolute bit address right after the
    /// last materialized child.
    pub fn cursor_address(&self, set: FieldSetId) -> u64 {
        self.absolute_address(set) + self.arena[set.0 as usize].current_size
    }

    fn node_size(&self, node: &FieldNode) -> u64 {
        match &node.content {
            FieldContent::Leaf { size_bits, .. } => *size_bits,
            FieldContent::Set(id) => {
                let slot = &self.arena[id.0 as usize];
                slot.own_size.unwrap_or(slot.current_size)
            }
        }
    }

    fn node_value(&self, set: FieldSetId, index: usize) -> Result<Value> {
        let node = self.arena[set.0 as usize].fields.get_by_index(index).unwrap();
        match &node.content {
            FieldContent::Leaf { kind, size_bits } => {
                let absolute = self.absolute_address(set) + node.address;
                let path = format!("{}/{}", self.path_of_set(set), node.name);
                kind.decode_value(&self.stream, absolute, *size_bits, node.endian, &path)
            }
            FieldContent::Set(_) => Ok(Value::Set),
        }
    }

    // ---- location-based read API ------------------------------------

    pub fn name(&self, loc: FieldLocation) -> &str {
        match loc {
            FieldLocation::Set(id) => &self.arena[id.0 as usize].name,
            FieldLocation::Child { parent, index } => self.arena[parent.0 as usize].fields.name_at(index).unwrap(),
        }
    }

    pub fn description(&self, loc: FieldLocation) -> Option<&str> {
        match loc {
            FieldLocation::Set(id) => self.arena[id.0 as usize].description.as_deref(),
            FieldLocation::Child { parent, index } => {
                self.arena[parent.0 as usize].fields.get_by_index(index).unwrap().description.as_deref()
            }
        }
    }

    pub fn endian(&self, loc: FieldLocation) -> Endian {
        match loc {
            FieldLocation::Set(id) => self.arena[id.0 as usize].endian,
            FieldLocation::Child { parent, index } => {
                self.arena[parent.0 as usize].fields.get_by_index(index).unwrap().endian
            }
        }
    }

    pub fn address(&self, loc: FieldLocation) -> u64 {
        match loc {
            FieldLocation::Set(id) => self.arena[id.0 as usize].address,
            FieldLocation::Child { parent, index } => self.arena[parent.0 as usize].fields.get_by_index(index).unwrap().address,
        }
    }

    pub fn absolute_address_of(&self, loc: FieldLocation) -> u64 {
        match loc {
            FieldLocation::Set(id) => self.absolute_address(id),
            FieldLocation::Child { parent, index } => {
                self.absolute_address(parent) + self.arena[parent.0 as usize].fields.get_by_index(index).unwrap().address
            }
        }
    }

    pub fn path(&self, loc: FieldLocation) -> String {
        match loc {
            FieldLocation::Set(id) => self.path_of_set(id),
            FieldLocation::Child { parent, index } => {
                format!("{}/{}", self.path_of_set(parent), self.arena[parent.0 as usize].fields.name_at(index).unwrap())
            }
        }
    }

    pub fn is_field_set(&self, loc: FieldLocation) -> bool {
        match loc {
            FieldLocation::Set(_) => true,
            FieldLocation::Child { parent, index } => {
                matches!(self.arena[parent.0 as usize].fields.get_by_index(index).unwrap().content, FieldContent::Set(_))
            }
        }
    }

    pub fn size_bits(&self, loc: FieldLocation) -> u64 {
        match loc {
            FieldLocation::Set(id) => self.arena[id.0 as usize].own_size.expect("a reachable field set's size is always resolved"),
            FieldLocation::Child { parent, index } => {
                let node = self.arena[parent.0 as usize].fields.get_by_index(index).unwrap();
                self.node_size(node)
            }
        }
    }

    pub fn value(&self, loc: FieldLocation) -> Result<Value> {
        match loc {
            FieldLocation::Set(_) => Ok(Value::Set),
            FieldLocation::Child { parent, index } => self.node_value(parent, index),
        }
    }

    pub fn display(&self, loc: FieldLocation) -> Result<String> {
        match loc {
            FieldLocation::Set(_) => Ok(self.description(loc).map(str::to_string).unwrap_or_else(|| self.name(loc).to_string())),
            FieldLocation::Child { parent, index } => {
                let node = self.arena[parent.0 as usize].fields.get_by_index(index).unwrap();
                match &node.content {
                    FieldContent::Leaf { kind, size_bits } => {
                        let value = self.node_value(parent, index)?;
                        let absolute = self.absolute_address(parent) + node.address;
                        Ok(kind.display(&value, &self.stream, absolute, *size_bits))
                    }
                    FieldContent::Set(_) => Ok(node.description.clone().unwrap_or_else(|| node.name.clone())),
                }
            }
        }
    }

    pub fn raw_display(&self, loc: FieldLocation) -> String {
        match loc {
            FieldLocation::Set(_) => String::new(),
            FieldLocation::Child { parent, index } => {
                let node = self.arena[parent.0 as usize].fields.get_by_index(index).unwrap();
                match &node.content {
                    FieldContent::Leaf { kind, size_bits } => {
                        let absolute = self.absolute_address(parent) + node.address;
                        kind.raw_display(&self.stream, absolute, *size_bits)
                    }
                    FieldContent::Set(_) => String::new(),
                }
            }
        }
    }

    /// Convenience for producers reading an already-yielded sibling's
    /// value (e.g. a length field deciding a following payload's size).
    pub fn value_of(&mut self, set: FieldSetId, name: &str) -> Result<Value> {
        let index = self.ensure_named(set, name)?;
        self.node_value(set, index)
    }

    /// Same as [`Self::value_of`] but for use from inside a
    /// [`crate::producer::Producer::next`], which only gets `&FieldTree`:
    /// looks up a child that must already be materialized (an earlier
    /// field in this same producer's sequence) without pulling. Fails
    /// `MissingField` rather than feeding, since feeding from inside a
    /// producer step would re-enter the driver.
    pub fn value_of_ready(&self, set: FieldSetId, name: &str) -> Result<Value> {
        let index = self.arena[set.0 as usize]
            .fields
            .index_of(name)
            .ok_or_else(|| CoreError::missing_field(format!("{}/{}", self.path_of_set(set), name)))?;
        self.node_value(set, index)
    }

    /// Same restriction as [`Self::value_of_ready`]: the arena id of an
    /// already-materialized nested field set child, for a producer that
    /// needs to read one of *its* already-fed children (e.g. a file
    /// entry reading its own already-fed header's `size` subfield).
    pub fn child_set_ready(&self, set: FieldSetId, name: &str) -> Option<FieldSetId> {
        let index = self.arena[set.0 as usize].fields.index_of(name)?;
        match self.arena[set.0 as usize].fields.get_by_index(index)?.content {
            FieldContent::Set(id) => Some(id),
            FieldContent::Leaf { .. } => None,
        }
    }

    // ---- path resolution (lazy: pulls as needed) ---------------------

    pub fn resolve(&mut self, from: FieldSetId, path: &str) -> Result<FieldLocation> {
        let anchored = path.starts_with('/');
        let trimmed = path.trim_start_matches('/');
        let mut current = if anchored { self.root() } else { from };
        if trimmed.is_empty() {
            return Ok(FieldLocation::Set(current));
        }
        let components: smallvec::SmallVec<[&str; 8]> = trimmed.split('/').filter(|c| !c.is_empty()).collect();
        let last = components.len() - 1;
        for (i, component) in components.iter().enumerate() {
            let is_last = i == last;
            if *component == ".." {
                current = self.arena[current.0 as usize].parent.ok_or_else(|| CoreError::missing_field(path.to_string()))?;
                if is_last {
                    return Ok(FieldLocation::Set(current));
                }
                continue;
            }
            let index = if let Ok(i) = component.parse::<usize>() {
                self.ensure_index(current, i)?;
                i
            } else {
                self.ensure_named(current, component)?
            };
            let content = self.arena[current.0 as usize].fields.get_by_index(index).unwrap().content.clone();
            match content {
                FieldContent::Set(id) if is_last => return Ok(FieldLocation::Set(id)),
                FieldContent::Set(id) => current = id,
                FieldContent::Leaf { .. } if is_last => return Ok(FieldLocation::Child { parent: current, index }),
                FieldContent::Leaf { .. } => return Err(CoreError::missing_field(path.to_string())),
            }
        }
        Ok(FieldLocation::Set(current))
    }

    fn ensure_named(&mut self, set: FieldSetId, name: &str) -> Result<usize> {
        loop {
            if let Some(idx) = self.arena[set.0 as usize].fields.index_of(name) {
                return Ok(idx);
            }
            if self.arena[set.0 as usize].sealed {
                return Err(CoreError::missing_field(format!("{}/{}", self.path_of_set(set), name)));
            }
            self.feed_one(set)?;
        }
    }

    fn ensure_index(&mut self, set: FieldSetId, index: usize) -> Result<()> {
        loop {
            if self.arena[set.0 as usize].fields.len() > index {
                return Ok(());
            }
            if self.arena[set.0 as usize].sealed {
                return Err(CoreError::missing_field(format!("{}[{}]", self.path_of_set(set), index)));
            }
            self.feed_one(set)?;
        }
    }

    // ---- feeding -------------------------------------------------

    /// Materialize every remaining child.
    pub fn feed_all(&mut self, set: FieldSetId) -> Result<()> {
        while !self.arena[set.0 as usize].sealed {
            self.feed_one(set)?;
        }
        Ok(())
    }

    /// Materialize up to `count` children total, or fewer if the producer
    /// seals first.
    pub fn read_first_fields(&mut self, set: FieldSetId, count: usize) -> Result<()> {
        while self.arena[set.0 as usize].fields.len() < count && !self.arena[set.0 as usize].sealed {
            self.feed_one(set)?;
        }
        Ok(())
    }

    pub fn read_more_fields(&mut self, set: FieldSetId, count: usize) -> Result<usize> {
        let mut added = 0;
        for _ in 0..count {
            if !self.feed_one(set)? {
                break;
            }
            added += 1;
        }
        Ok(added)
    }

    /// Pull one more field into `set`, if not sealed. Returns whether a
    /// field was actually appended.
    fn feed_one(&mut self, set: FieldSetId) -> Result<bool> {
        if self.arena[set.0 as usize].sealed {
            return Ok(false);
        }
        let mut producer = std::mem::replace(&mut self.arena[set.0 as usize].producer, Box::new(NullProducer));
        let outcome = producer.next(self, set);
        self.arena[set.0 as usize].producer = producer;
        match outcome {
            Ok(Some(spec)) => {
                if self.options.debug {
                    tracing::debug!(path = %self.path_of_set(set), name = %spec.name, "pulling field");
                }
                match self.add_field(set, spec) {
                    Ok(()) => Ok(true),
                    Err(err) => {
                        self.fix_feed_error(set, err)?;
                        Ok(true)
                    }
                }
            }
            Ok(None) => {
                self.stop_feeding(set)?;
                Ok(false)
            }
            Err(err) => {
                self.fix_feed_error(set, err)?;
                Ok(false)
            }
        }
    }

    fn materialize_payload(&mut self, payload: FieldPayload, parent: FieldSetId, endian: Endian, path_for_errors: &str) -> Result<(FieldContent, u64)> {
        match payload {
            FieldPayload::Leaf(kind) => {
                let absolute = self.cursor_address(parent);
                let size_bits = match kind.static_size_bits() {
                    Some(n) => n,
                    None => kind.compute_size_bits(&self.stream, absolute, endian, path_for_errors)?,
                };
                Ok((FieldContent::Leaf { kind, size_bits }, size_bits))
            }
            FieldPayload::Set { producer, size_bits } => {
                let address = self.arena[parent.0 as usize].current_size;
                let child_id = FieldSetId(self.arena.len() as u32);
                self.arena.push(FieldSetSlot {
                    parent: Some(parent),
                    name: String::new(), // filled in by the caller once the (possibly renamed) name is known
                    address,
                    description: None,
                    endian,
                    own_size: size_bits,
                    current_size: 0,
                    fields: OrderedUniqueMap::new(),
                    producer,
                    sealed: false,
                    array_counters: HashMap::new(),
                    local_events: None,
                });
                let resolved_size = match size_bits {
                    Some(n) => n,
                    None => {
                        self.feed_all(child_id)?;
                        self.arena[child_id.0 as usize].own_size.unwrap_or(self.arena[child_id.0 as usize].current_size)
                    }
                };
                Ok((FieldContent::Set(child_id), resolved_size))
            }
        }
    }

    fn add_field(&mut self, set: FieldSetId, spec: FieldSpec) -> Result<()> {
        let FieldSpec { name, description, endian_override, payload } = spec;
        let name = self.unique_name(set, name);
        let endian = endian_override.unwrap_or(self.arena[set.0 as usize].endian);
        let address = self.arena[set.0 as usize].current_size;
        let path_for_errors = format!("{}/{}", self.path_of_set(set), name);

        let (content, size_bits) = self.materialize_payload(payload, set, endian, &path_for_errors)?;
        if let FieldContent::Set(child_id) = &content {
            let child_id = *child_id;
            self.arena[child_id.0 as usize].name = name.clone();
            self.arena[child_id.0 as usize].description = description.clone();
        }

        let remaining = self.check_size(set, address + size_bits);
        let is_degenerate_set = matches!(content, FieldContent::Set(_)) && size_bits == 0;
        if remaining.map(|r| r < 0).unwrap_or(false) || is_degenerate_set {
            if self.options.autofix {
                return self.fix_oversized_field(set, name, description, endian, content, size_bits, remaining.unwrap_or(0));
            }
            return Err(CoreError::parser(path_for_errors, "field is too large for its parent"));
        }

        self.append_child(set, name, description, endian, content, size_bits)
    }

    fn append_child(&mut self, set: FieldSetId, mut name: String, description: Option<String>, endian: Endian, content: FieldContent, size_bits: u64) -> Result<()> {
        if self.arena[set.0 as usize].fields.index_of(&name).is_some() {
            tracing::warn!(path = %self.path_of_set(set), name = %name, "duplicate field name, renaming");
            name = self.unique_name(set, format!("{name}[]"));
        }
        let address = self.arena[set.0 as usize].current_size;
        if let FieldContent::Set(child_id) = &content {
            self.arena[child_id.0 as usize].name = name.clone();
        }
        let node = FieldNode { name: name.clone(), address, description, endian, content };
        let slot = &mut self.arena[set.0 as usize];
        slot.fields.append(name, node).expect("name was freshly uniquified");
        slot.current_size += size_bits;
        Ok(())
    }

    fn unique_name(&mut self, set: FieldSetId, name: String) -> String {
        match name.strip_suffix("[]") {
            Some(prefix) => {
                let slot = &mut self.arena[set.0 as usize];
                let counter = slot.array_counters.entry(prefix.to_string()).or_insert(0);
                let idx = *counter;
                *counter += 1;
                format!("{prefix}[{idx}]")
            }
            None => name,
        }
    }

    fn fix_oversized_field(&mut self, set: FieldSetId, name: String, description: Option<String>, endian: Endian, content: FieldContent, size_bits: u64, remaining: i64) -> Result<()> {
        tracing::warn!(path = %self.path_of_set(set), name = %name, "autofix: field too large, repairing");
        let new_size = (size_bits as i64 + remaining).max(0) as u64;
        if new_size > 0 {
            if let FieldContent::Set(child_id) = content {
                if self.arena[child_id.0 as usize].current_size > 0 {
                    self.truncate(child_id, new_size)?;
                    return self.append_child(set, name, description, endian, FieldContent::Set(child_id), new_size);
                }
            }
            let slot = &mut self.arena[set.0 as usize];
            if slot.own_size.is_none() {
                slot.own_size = Some(slot.current_size + new_size);
            }
        }
        self.stop_feeding(set)
    }

    fn stop_feeding(&mut self, set: FieldSetId) -> Result<()> {
        self.arena[set.0 as usize].sealed = true;
        let current_size = self.arena[set.0 as usize].current_size;
        match self.arena[set.0 as usize].own_size {
            None => {
                if self.arena[set.0 as usize].parent.is_some() {
                    self.arena[set.0 as usize].own_size = Some(current_size);
                }
                Ok(())
            }
            Some(declared) if declared != current_size => {
                if self.options.autofix {
                    self.fix_last_field(set, declared, current_size)
                } else {
                    Err(CoreError::parser(self.path_of_set(set), format!("declared size {declared} bits but produced {current_size} bits")))
                }
            }
            Some(_) => Ok(()),
        }
    }

    fn fix_last_field(&mut self, set: FieldSetId, declared: u64, mut current_size: u64) -> Result<()> {
        while current_size > declared {
            let len = self.arena[set.0 as usize].fields.len();
            if len == 0 {
                break;
            }
            let removed = self.arena[set.0 as usize].fields.delete_at(len - 1);
            tracing::warn!(path = %self.path_of_set(set), field = %removed.name, "autofix: dropping field that overruns declared size");
            current_size -= self.node_size(&removed);
        }
        self.arena[set.0 as usize].current_size = current_size;
        if current_size < declared {
            let pad = declared - current_size;
            let name = self.unique_name(set, "raw[]".to_string());
            let node = FieldNode {
                name: name.clone(),
                address: current_size,
                description: Some("Autofix padding".to_string()),
                endian: self.arena[set.0 as usize].endian,
                content: FieldContent::Leaf { kind: LeafKind::PaddingBits { nbits: pad.min(u32::MAX as u64) as u32, pattern: None }, size_bits: pad },
            };
            let slot = &mut self.arena[set.0 as usize];
            slot.fields.append(name, node).expect("raw[] name was freshly uniquified");
            slot.current_size = declared;
        }
        Ok(())
    }

    fn fix_feed_error(&mut self, set: FieldSetId, err: CoreError) -> Result<()> {
        if !self.options.autofix {
            return Err(err);
        }
        let declared = self.arena[set.0 as usize].own_size.or_else(|| self.check_size(set, 0).map(|r| r.max(0) as u64));
        let Some(declared) = declared else {
            return Err(err);
        };
        tracing::warn!(path = %self.path_of_set(set), error = %err, "autofix: sealing field set after feed error");
        self.arena[set.0 as usize].own_size = Some(declared);
        self.fix_last_field(set, declared, self.arena[set.0 as usize].current_size)
    }

    // ---- random-access editing ---------------------------------------

    pub fn replace_field(&mut self, set: FieldSetId, name: &str, new_fields: Vec<FieldSpec>) -> Result<()> {
        let old_index = self
            .arena[set.0 as usize]
            .fields
            .index_of(name)
            .ok_or_else(|| CoreError::parser(self.path_of_set(set), format!("unable to replace {name}: field doesn't exist")))?;
        if new_fields.is_empty() {
            return Err(CoreError::parser(self.path_of_set(set), "replace_field requires at least one new field"));
        }
        let old_node = self.arena[set.0 as usize].fields.get_by_index(old_index).unwrap().clone();
        let old_address = old_node.address;
        let old_size = self.node_size(&old_node);
        let old_path = format!("{}/{}", self.path_of_set(set), name);

        let mut built = Vec::new();
        let mut running_address = old_address;
        for spec in new_fields {
            let endian = spec.endian_override.unwrap_or(self.arena[set.0 as usize].endian);
            self.arena[set.0 as usize].current_size = running_address;
            let (content, size) = self.materialize_payload(spec.payload, set, endian, &old_path)?;
            built.push((spec.name, spec.description, endian, content, size));
            running_address += size;
        }
        self.arena[set.0 as usize].current_size = old_address + old_size;

        let total_size: u64 = built.iter().map(|(_, _, _, _, s)| *s).sum();
        if total_size != old_size {
            return Err(CoreError::parser(old_path, format!("unable to replace {name}: new field(s) total {total_size} bits, expected {old_size} bits")));
        }

        let mut built = built.into_iter();
        let (first_name, first_desc, first_endian, first_content, first_size) = built.next().unwrap();
        let first_name = self.unique_name(set, first_name);
        if let FieldContent::Set(child_id) = &first_content {
            self.arena[child_id.0 as usize].name = first_name.clone();
            self.arena[child_id.0 as usize].description = first_desc.clone();
        }
        let node = FieldNode { name: first_name.clone(), address: old_address, description: first_desc, endian: first_endian, content: first_content };
        self.arena[set.0 as usize].fields.replace(name, first_name.clone(), node)?;
        let new_path = format!("{}/{}", self.path_of_set(set), first_name);
        self.raise_event(set, Event::FieldReplaced { old_path: old_path.clone(), new_path });

        let mut insert_index = self.arena[set.0 as usize].fields.index_of(&first_name).unwrap() + 1;
        let mut next_address = old_address + first_size;
        for (n, desc, endian, content, size) in built {
            let n = self.unique_name(set, n);
            if self.arena[set.0 as usize].fields.index_of(&n).is_some() {
                return Err(CoreError::parser(old_path, format!("unable to replace {name}: name {n:?} is already used")));
            }
            if let FieldContent::Set(child_id) = &content {
                self.arena[child_id.0 as usize].name = n.clone();
                self.arena[child_id.0 as usize].description = desc.clone();
            }
            let node = FieldNode { name: n.clone(), address: next_address, description: desc, endian, content };
            self.arena[set.0 as usize].fields.insert_at(insert_index, n.clone(), node)?;
            let path = format!("{}/{}", self.path_of_set(set), n);
            self.raise_event(set, Event::FieldInserted { index: insert_index, path });
            insert_index += 1;
            next_address += size;
        }
        Ok(())
    }

    pub fn write_fields_in(&mut self, set: FieldSetId, old_name: &str, address: u64, mut new_fields: Vec<FieldSpec>) -> Result<()> {
        let old_index = self.arena[set.0 as usize].fields.index_of(old_name).ok_or_else(|| CoreError::missing_field(old_name.to_string()))?;
        let old_node = self.arena[set.0 as usize].fields.get_by_index(old_index).unwrap();
        let old_address = old_node.address;
        let old_size = self.node_size(old_node);
        let path = self.path_of_set(set);

        let mut total = 0u64;
        for f in &new_fields {
            total += match &f.payload {
                FieldPayload::Leaf(k) => k.static_size_bits().unwrap_or(0),
                FieldPayload::Set { size_bits, .. } => {
                    size_bits.ok_or_else(|| CoreError::parser(path.as_str(), "write_fields_in requires an explicit size for nested field sets"))?
                }
            };
        }
        if old_size < total {
            return Err(CoreError::parser(path.as_str(), format!("unable to write fields at address {address} (too big)")));
        }

        let mut assembled = Vec::new();
        let lead = address
            .checked_sub(old_address)
            .ok_or_else(|| CoreError::parser(path.as_str(), "write_fields_in: address precedes the field being written into"))?;
        if lead > 0 {
            assembled.push(FieldSpec::leaf("padding[]", LeafKind::PaddingBits { nbits: lead as u32, pattern: None }));
        }
        assembled.append(&mut new_fields);
        let written_end = address + total;
        let old_end = old_address + old_size;
        // Resolved per spec §9's open question: an underflow here is a
        // structural error, surfaced as `CoreError::Parser`, not a panic.
        let trail = old_end
            .checked_sub(written_end)
            .ok_or_else(|| CoreError::parser(path.as_str(), "write_fields_in: new fields overrun the field being written into"))?;
        if trail > 0 {
            assembled.push(FieldSpec::leaf("padding[]", LeafKind::PaddingBits { nbits: trail as u32, pattern: None }));
        }
        let name = old_name.to_string();
        self.replace_field(set, &name, assembled)
    }

    pub fn truncate(&mut self, set: FieldSetId, new_size: u64) -> Result<()> {
        let current_size = self.arena[set.0 as usize].current_size;
        if new_size < current_size {
            loop {
                let len = self.arena[set.0 as usize].fields.len();
                if len == 0 {
                    break;
                }
                let last = self.arena[set.0 as usize].fields.get_by_index(len - 1).unwrap();
                if last.address < new_size {
                    break;
                }
                self.arena[set.0 as usize].fields.delete_at(len - 1);
            }
            let len = self.arena[set.0 as usize].fields.len();
            if len > 0 {
                let last = self.arena[set.0 as usize].fields.get_by_index(len - 1).unwrap().clone();
                let boundary_size = self.node_size(&last);
                let remaining_in_last = new_size - last.address;
                if remaining_in_last < boundary_size {
                    if let FieldContent::Set(child_id) = last.content {
                        self.truncate(child_id, remaining_in_last)?;
                    } else {
                        self.arena[set.0 as usize].fields.delete_at(len - 1);
                        let name = self.unique_name(set, "raw[]".to_string());
                        let node = FieldNode {
                            name: name.clone(),
                            address: last.address,
                            description: Some("Truncated remainder".to_string()),
                            endian: self.arena[set.0 as usize].endian,
                            content: FieldContent::Leaf {
                                kind: LeafKind::PaddingBits { nbits: remaining_in_last as u32, pattern: None },
                                size_bits: remaining_in_last,
                            },
                        };
                        self.arena[set.0 as usize].fields.append(name, node).expect("raw[] name was freshly uniquified");
                    }
                }
            }
            self.arena[set.0 as usize].current_size = new_size;
            self.arena[set.0 as usize].own_size = Some(new_size);
        } else {
            self.arena[set.0 as usize].own_size = Some(new_size);
        }
        if self.arena[set.0 as usize].own_size == Some(self.arena[set.0 as usize].current_size) {
            self.arena[set.0 as usize].sealed = true;
        }
        Ok(())
    }

    pub fn reset(&mut self, set: FieldSetId) {
        let slot = &mut self.arena[set.0 as usize];
        slot.fields = OrderedUniqueMap::new();
        slot.current_size = 0;
        slot.array_counters.clear();
        slot.sealed = false;
        slot.producer.reset();
    }

    /// Snapshot of every currently-materialized child named `prefix[i]`,
    /// after forcing the set fully fed. (An eagerly-forced snapshot rather
    /// than a cached lazy view: once a set is sealed the two are
    /// observationally identical, and the cache object bought nothing.)
    pub fn array(&mut self, set: FieldSetId, prefix: &str) -> Result<Vec<FieldLocation>> {
        self.feed_all(set)?;
        let mut out = Vec::new();
        let mut i = 0usize;
        loop {
            let candidate = format!("{prefix}[{i}]");
            match self.arena[set.0 as usize].fields.index_of(&candidate) {
                Some(index) => {
                    let content = self.arena[set.0 as usize].fields.get_by_index(index).unwrap().content.clone();
                    out.push(match content {
                        FieldContent::Set(id) => FieldLocation::Set(id),
                        FieldContent::Leaf { .. } => FieldLocation::Child { parent: set, index },
                    });
                    i += 1;
                }
                None => break,
            }
        }
        Ok(out)
    }

    // ---- events -----------------------------------------------------

    pub fn connect_event(&mut self, set: FieldSetId, local: bool, kind: EventKind, handler: impl FnMut(&Event) + Send + 'static) {
        if local {
            self.arena[set.0 as usize].local_events.get_or_insert_with(EventHandler::new).connect(kind, handler);
        } else {
            self.global_events.get_or_insert_with(EventHandler::new).connect(kind, handler);
        }
    }

    fn raise_event(&mut self, set: FieldSetId, event: Event) {
        if let Some(handler) = self.arena[set.0 as usize].local_events.as_mut() {
            handler.raise(&event);
        }
        if let Some(handler) = self.global_events.as_mut() {
            handler.raise(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::StepProducer;
    use crate::stream::InputStream;

    /// A two-leaf producer whose children (48 bits each) sum to more than
    /// the 80-bit parent size the tests below declare, exercising spec §8
    /// scenario (e): "Producer that yields a child extending past parent's
    /// size".
    fn overflowing_producer() -> Box<dyn Producer> {
        Box::new(StepProducer::new(|_tree: &FieldTree, _set: FieldSetId, step: u32| {
            Ok(match step {
                0 => Some(FieldSpec::leaf("a", LeafKind::RawBytes(6))),
                1 => Some(FieldSpec::leaf("b", LeafKind::RawBytes(6))),
                _ => None,
            })
        }))
    }

    fn build(autofix: bool) -> FieldTree {
        let stream = InputStream::from_bytes(vec![0u8; 12], Endian::Big, "test");
        let options = ParserOptions { autofix, debug: false };
        FieldTree::new(stream, options, "root", None, Endian::Big, overflowing_producer(), Some(80))
    }

    #[test]
    fn autofix_truncates_an_overflowing_field_set_to_its_declared_size() {
        let mut tree = build(true);
        let root = tree.root();
        tree.feed_all(root).unwrap();
        assert_eq!(tree.current_size(root), 80);
        assert!(tree.done(root));
    }

    #[test]
    fn autofix_disabled_surfaces_a_parser_error() {
        let mut tree = build(false);
        let root = tree.root();
        let err = tree.feed_all(root).unwrap_err();
        assert!(matches!(err, CoreError::Parser { .. }));
    }
}
