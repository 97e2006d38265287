/*!
Object tree: a weak, purely administrative hierarchy used to route
debug and inspection commands by dotted path.

This has no effect on simulation semantics. A component registers
itself (and, transitively, the clocks/processes/storages it owns)
under a parent object so that external tools — a debugger CLI, a test
harness — can address it as `"core0.pipeline.fetch"` without every
caller needing to keep its own map of names to handles. Name
resolution is case-insensitive, matching the reference simulator's
command-line object addressing.
*/

use crate::error::SetupError;
use crate::ids::{Arena, Id};

pub(crate) struct ObjectData {
    name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

pub type ObjectId = Id<ObjectData>;

#[derive(Default)]
pub(crate) struct ObjectTree {
    arena: Arena<ObjectData>,
    roots: Vec<ObjectId>,
}

impl ObjectTree {
    pub fn new() -> Self {
        ObjectTree::default()
    }

    pub fn create(&mut self, parent: Option<ObjectId>, name: &str) -> Result<ObjectId, SetupError> {
        let siblings: &[ObjectId] = match parent {
            Some(p) => &self.arena.get(p).children,
            None => &self.roots,
        };
        if siblings
            .iter()
            .any(|&s| self.arena.get(s).name.eq_ignore_ascii_case(name))
        {
            let parent_path = parent.map(|p| self.path(p)).unwrap_or_else(|| "<root>".to_string());
            return Err(SetupError::DuplicateChildName(name.to_string(), parent_path));
        }

        let id = self.arena.insert(ObjectData { name: name.to_string(), parent, children: Vec::new() });
        match parent {
            Some(p) => self.arena.get_mut(p).children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    pub fn path(&self, id: ObjectId) -> String {
        let mut segments = vec![self.arena.get(id).name.clone()];
        let mut current = self.arena.get(id).parent;
        while let Some(p) = current {
            segments.push(self.arena.get(p).name.clone());
            current = self.arena.get(p).parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Resolve a dotted, case-insensitive path such as `"core0.fetch"`
    /// to the object registered there.
    pub fn resolve(&self, path: &str) -> Result<ObjectId, SetupError> {
        let mut candidates = &self.roots;
        let mut found: Option<ObjectId> = None;
        for segment in path.split('.') {
            found = candidates
                .iter()
                .copied()
                .find(|&c| self.arena.get(c).name.eq_ignore_ascii_case(segment));
            match found {
                Some(id) => candidates = &self.arena.get(id).children,
                None => return Err(SetupError::UnknownPath(path.to_string())),
            }
        }
        found.ok_or_else(|| SetupError::UnknownPath(path.to_string()))
    }
}
