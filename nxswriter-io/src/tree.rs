//! Node arena for one open file.
//!
//! Every user handle owns exactly one slot. A slot remembers its parent and
//! children so `close` and `reopen` can fan out; a slot whose handle was
//! dropped lingers while it still has children, so descendants can be
//! rebound through it.

use crate::backend::{Backend, FileAccess, Location, RawEntry};
use log::{debug, warn};
use nxswriter_core::{Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) type NodeId = usize;

/// Slot 0 always holds the file itself.
pub(crate) const FILE_ID: NodeId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    File,
    Root,
    Group,
    Field,
    Link,
    Attributes,
    Attribute,
}

impl Kind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Kind::File => "file",
            Kind::Root | Kind::Group => "group",
            Kind::Field => "field",
            Kind::Link => "link",
            Kind::Attributes => "attribute manager",
            Kind::Attribute => "attribute",
        }
    }
}

pub(crate) enum Binding<B: Backend> {
    File,
    Group(B::Group),
    Field(B::Field),
    Link(B::Link),
    Attributes,
    Attribute(B::Attribute),
}

pub(crate) struct Slot<B: Backend> {
    pub(crate) kind: Kind,
    pub(crate) name: String,
    pub(crate) path: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    binding: Option<Binding<B>>,
    closed: bool,
    held: bool,
}

pub(crate) struct Tree<B: Backend> {
    file: Option<B::File>,
    access: FileAccess,
    slots: Vec<Option<Slot<B>>>,
    free: Vec<NodeId>,
}

/// Shared state behind every handle of one file.
pub(crate) struct Session<B: Backend> {
    pub(crate) backend: Arc<B>,
    pub(crate) path: PathBuf,
    tree: Mutex<Tree<B>>,
}

impl<B: Backend> Session<B> {
    pub(crate) fn new(backend: Arc<B>, path: PathBuf, file: B::File, access: FileAccess) -> Self {
        let slot = Slot {
            kind: Kind::File,
            name: path.display().to_string(),
            path: "/".to_string(),
            parent: None,
            children: Vec::new(),
            binding: Some(Binding::File),
            closed: false,
            held: true,
        };
        Self {
            backend,
            path,
            tree: Mutex::new(Tree {
                file: Some(file),
                access,
                slots: vec![Some(slot)],
                free: Vec::new(),
            }),
        }
    }

    /// The single critical section of this file.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Tree<B>> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn file_name(&self) -> String {
        self.path.display().to_string()
    }
}

fn stale(slot: &Slot<impl Backend>) -> Error {
    Error::StaleHandle(format!("{} {} is not open", slot.kind.label(), slot.path))
}

pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

impl<B: Backend> Tree<B> {
    pub(crate) fn access(&self) -> FileAccess {
        self.access
    }

    pub(crate) fn slot(&self, id: NodeId) -> Result<&Slot<B>> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::StaleHandle(format!("node {id} was released")))
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot<B>> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    fn binding(&self, id: NodeId) -> Result<&Binding<B>> {
        let slot = self.slot(id)?;
        if slot.closed || self.file.is_none() {
            return Err(stale(slot));
        }
        slot.binding.as_ref().ok_or_else(|| stale(slot))
    }

    /// Whether the node can be used; never fails.
    pub(crate) fn is_valid(&self, id: NodeId) -> bool {
        self.binding(id).is_ok()
    }

    pub(crate) fn native_file(&self) -> Result<&B::File> {
        self.binding(FILE_ID)?;
        self.file
            .as_ref()
            .ok_or_else(|| Error::StaleHandle("file is closed".to_string()))
    }

    pub(crate) fn group(&self, id: NodeId) -> Result<&B::Group> {
        match self.binding(id)? {
            Binding::Group(group) => Ok(group),
            _ => Err(Error::NotFound(format!("{} is not a group", self.slot(id)?.path))),
        }
    }

    pub(crate) fn field(&self, id: NodeId) -> Result<&B::Field> {
        match self.binding(id)? {
            Binding::Field(field) => Ok(field),
            _ => Err(Error::NotFound(format!("{} is not a field", self.slot(id)?.path))),
        }
    }

    pub(crate) fn link(&self, id: NodeId) -> Result<&B::Link> {
        match self.binding(id)? {
            Binding::Link(link) => Ok(link),
            _ => Err(Error::NotFound(format!("{} is not a link", self.slot(id)?.path))),
        }
    }

    pub(crate) fn attribute(&self, id: NodeId) -> Result<&B::Attribute> {
        match self.binding(id)? {
            Binding::Attribute(attribute) => Ok(attribute),
            _ => Err(Error::NotFound(format!(
                "{} is not an attribute",
                self.slot(id)?.path
            ))),
        }
    }

    /// Owner of the attribute manager `id`.
    pub(crate) fn location(&self, id: NodeId) -> Result<Location<'_, B>> {
        self.binding(id)?;
        let owner = self
            .slot(id)?
            .parent
            .ok_or_else(|| Error::NotFound("attribute manager without owner".to_string()))?;
        match self.binding(owner)? {
            Binding::Group(group) => Ok(Location::Group(group)),
            Binding::Field(field) => Ok(Location::Field(field)),
            _ => Err(Error::NotFound(format!(
                "{} cannot hold attributes",
                self.slot(owner)?.path
            ))),
        }
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|slot| slot.parent)
    }

    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        kind: Kind,
        name: &str,
        binding: Binding<B>,
    ) -> Result<NodeId> {
        let parent_path = self.slot(parent)?.path.clone();
        let path = match kind {
            Kind::Root => "/".to_string(),
            Kind::Attributes => parent_path,
            Kind::Attribute => format!("{parent_path}@{name}"),
            _ => child_path(&parent_path, name),
        };
        let slot = Slot {
            kind,
            name: name.to_string(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            binding: Some(binding),
            closed: false,
            held: true,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        if let Some(parent) = self.slot_mut(parent) {
            parent.children.push(id);
        }
        Ok(id)
    }

    /// The handle of `id` was dropped.
    pub(crate) fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.held = false;
        }
        self.prune(id);
    }

    fn prune(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let removable = self
                .slot(id)
                .is_ok_and(|slot| !slot.held && slot.children.is_empty() && id != FILE_ID);
            if !removable {
                return;
            }
            let parent = self.slots[id].take().and_then(|slot| slot.parent);
            self.free.push(id);
            if let Some(parent_id) = parent {
                if let Some(parent) = self.slot_mut(parent_id) {
                    parent.children.retain(|&child| child != id);
                }
            }
            current = parent;
        }
    }

    fn descendants_post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            stack.push((node, true));
            if let Ok(slot) = self.slot(node) {
                for &child in slot.children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    /// Closes `id` and everything below it, children first. Idempotent.
    pub(crate) fn close(&mut self, backend: &B, id: NodeId) -> Result<()> {
        for node in self.descendants_post_order(id) {
            if let Some(slot) = self.slot_mut(node) {
                if !slot.closed {
                    debug!("closing {} {}", slot.kind.label(), slot.path);
                }
                slot.binding = None;
                slot.closed = true;
            }
        }
        if id == FILE_ID {
            if let Some(file) = self.file.take() {
                backend.close_file(file)?;
            }
        }
        Ok(())
    }

    /// Drops the native handles below `id` without marking anything closed.
    fn unbind_below(&mut self, id: NodeId) {
        for node in self.descendants_post_order(id) {
            if node == id {
                continue;
            }
            if let Some(slot) = self.slot_mut(node) {
                slot.binding = None;
            }
        }
    }

    fn fresh_binding(&self, backend: &B, id: NodeId) -> Result<Binding<B>> {
        let slot = self.slot(id)?;
        if slot.kind == Kind::File {
            self.native_file()?;
            return Ok(Binding::File);
        }
        let parent = slot.parent.ok_or_else(|| stale(slot))?;
        match slot.kind {
            Kind::File => Ok(Binding::File),
            Kind::Root => Ok(Binding::Group(backend.root(self.native_file()?)?)),
            Kind::Group | Kind::Field => {
                match backend.open(self.group(parent)?, &slot.name)? {
                    RawEntry::Group(group) if slot.kind == Kind::Group => Ok(Binding::Group(group)),
                    RawEntry::Field(field) if slot.kind == Kind::Field => Ok(Binding::Field(field)),
                    _ => Err(Error::NotFound(format!(
                        "{} is no longer a {}",
                        slot.path,
                        slot.kind.label()
                    ))),
                }
            }
            Kind::Link => Ok(Binding::Link(
                backend.open_link(self.group(parent)?, &slot.name)?,
            )),
            Kind::Attributes => {
                self.binding(parent)?;
                Ok(Binding::Attributes)
            }
            Kind::Attribute => Ok(Binding::Attribute(
                backend.open_attribute(self.location(parent)?, &slot.name)?,
            )),
        }
    }

    /// Rebinds `id` from its parent, then its children. Children that cannot
    /// be rebound stay stale.
    pub(crate) fn rebind(&mut self, backend: &B, id: NodeId) -> Result<()> {
        let binding = self.fresh_binding(backend, id)?;
        if let Some(slot) = self.slot_mut(id) {
            slot.binding = Some(binding);
            slot.closed = false;
        }
        let children = self.slot(id).map(|slot| slot.children.clone()).unwrap_or_default();
        for child in children {
            if let Err(err) = self.rebind(backend, child) {
                let path = self.slot(child).map(|slot| slot.path.clone()).unwrap_or_default();
                warn!("{path} could not be reopened: {err}");
                if let Some(slot) = self.slot_mut(child) {
                    slot.binding = None;
                }
            }
        }
        Ok(())
    }

    /// Closes and reopens the native file with `access`, then rebinds every
    /// live node.
    pub(crate) fn reopen_file(
        &mut self,
        backend: &B,
        path: &std::path::Path,
        access: FileAccess,
    ) -> Result<()> {
        self.unbind_below(FILE_ID);
        if let Some(file) = self.file.take() {
            backend.close_file(file)?;
        }
        self.file = Some(backend.open_file(path, access)?);
        self.access = access;
        if let Some(slot) = self.slot_mut(FILE_ID) {
            slot.binding = Some(Binding::File);
            slot.closed = false;
        }
        self.rebind(backend, FILE_ID)
    }
}
