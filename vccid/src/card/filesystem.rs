//! Card file hierarchy
//!
//! All nodes live in one owning table keyed by file identifier. A node names
//! its parent and children by key only, so the tree carries no reference
//! cycles and ascent is a table lookup.

use std::collections::HashMap;

use thiserror::Error;

use crate::tlv::{tags, TLVBuilder};

/// Two-byte ISO 7816-4 file identifier
pub type FileId = u16;

/// Master File identifier
pub const MF_ID: FileId = 0x3F00;

/// File descriptor bytes
pub mod fdb {
    /// Dedicated file (directory)
    pub const DF: u8 = 0x38;
    /// Working elementary file, transparent structure
    pub const WORKING_EF: u8 = 0x01;
}

/// Errors raised while building a file hierarchy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileSystemError {
    #[error("file identifier {0:04X} already exists")]
    DuplicateFileId(FileId),

    #[error("file identifier {0:04X} is reserved")]
    ReservedFileId(FileId),

    #[error("parent {0:04X} does not exist")]
    ParentNotFound(FileId),

    #[error("parent {0:04X} is not a dedicated file")]
    ParentNotDedicated(FileId),
}

/// One file in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    fid: FileId,
    descriptor: u8,
    parent: Option<FileId>,
    children: Vec<FileId>,
}

impl FileNode {
    fn new(fid: FileId, descriptor: u8, parent: Option<FileId>) -> Self {
        Self {
            fid,
            descriptor,
            parent,
            children: Vec::new(),
        }
    }

    pub fn fid(&self) -> FileId {
        self.fid
    }

    pub fn descriptor(&self) -> u8 {
        self.descriptor
    }

    /// Parent key, `None` for the MF
    pub fn parent(&self) -> Option<FileId> {
        self.parent
    }

    /// Child keys in insertion order
    pub fn children(&self) -> &[FileId] {
        &self.children
    }

    pub fn is_dedicated(&self) -> bool {
        self.descriptor == fdb::DF
    }

    /// File Control Information: `6F L 82 01 <fdb> 83 02 <fid>`
    pub fn fci(&self) -> Vec<u8> {
        TLVBuilder::new()
            .add(tags::FILE_DESCRIPTOR, &[self.descriptor])
            .add(tags::FILE_IDENTIFIER, &self.fid.to_be_bytes())
            .wrap(tags::FCI_TEMPLATE)
            .build()
    }
}

/// Immutable-after-construction file table rooted at the MF
#[derive(Debug, Clone)]
pub struct FileSystem {
    nodes: HashMap<FileId, FileNode>,
}

impl FileSystem {
    /// A hierarchy holding only the MF
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(MF_ID, FileNode::new(MF_ID, fdb::DF, None));
        Self { nodes }
    }

    /// Add a dedicated file under `parent`
    pub fn add_df(&mut self, parent: FileId, fid: FileId) -> Result<(), FileSystemError> {
        self.add(parent, fid, fdb::DF)
    }

    /// Add a working elementary file under `parent`
    pub fn add_ef(&mut self, parent: FileId, fid: FileId) -> Result<(), FileSystemError> {
        self.add(parent, fid, fdb::WORKING_EF)
    }

    fn add(&mut self, parent: FileId, fid: FileId, descriptor: u8) -> Result<(), FileSystemError> {
        // 3FFF and FFFF are reserved by ISO 7816-4
        if fid == 0x3FFF || fid == 0xFFFF {
            return Err(FileSystemError::ReservedFileId(fid));
        }
        if self.nodes.contains_key(&fid) {
            return Err(FileSystemError::DuplicateFileId(fid));
        }
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(FileSystemError::ParentNotFound(parent))?;
        if !parent_node.is_dedicated() {
            return Err(FileSystemError::ParentNotDedicated(parent));
        }

        parent_node.children.push(fid);
        self.nodes.insert(fid, FileNode::new(fid, descriptor, Some(parent)));
        Ok(())
    }

    pub fn get(&self, fid: FileId) -> Option<&FileNode> {
        self.nodes.get(&fid)
    }

    pub fn mf(&self) -> &FileNode {
        // The MF is inserted by the constructor and never removed
        &self.nodes[&MF_ID]
    }

    /// Parent of `fid`, `None` for the MF or an unknown file
    pub fn parent_of(&self, fid: FileId) -> Option<&FileNode> {
        self.get(fid)?.parent.and_then(|parent| self.get(parent))
    }

    /// First child of `current` whose identifier is `fid`
    pub fn child_of(&self, current: FileId, fid: FileId) -> Option<&FileNode> {
        self.get(current)?
            .children
            .iter()
            .find(|&&child| child == fid)
            .and_then(|child| self.get(*child))
    }

    /// Number of files including the MF
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileSystem {
        let mut fs = FileSystem::new();
        fs.add_df(MF_ID, 0x5000).unwrap();
        fs.add_ef(0x5000, 0x5001).unwrap();
        fs.add_ef(MF_ID, 0x2F00).unwrap();
        fs
    }

    #[test]
    fn test_new_has_mf() {
        let fs = FileSystem::new();
        assert_eq!(fs.len(), 1);
        assert_eq!(fs.mf().fid(), MF_ID);
        assert!(fs.mf().is_dedicated());
        assert_eq!(fs.mf().parent(), None);
    }

    #[test]
    fn test_mf_fci() {
        let fs = FileSystem::new();
        assert_eq!(
            fs.mf().fci(),
            vec![0x6F, 0x07, 0x82, 0x01, 0x38, 0x83, 0x02, 0x3F, 0x00]
        );
    }

    #[test]
    fn test_ef_fci() {
        let fs = sample();
        assert_eq!(
            fs.get(0x5001).unwrap().fci(),
            vec![0x6F, 0x07, 0x82, 0x01, 0x01, 0x83, 0x02, 0x50, 0x01]
        );
    }

    #[test]
    fn test_children_in_insertion_order() {
        let fs = sample();
        assert_eq!(fs.mf().children(), &[0x5000, 0x2F00]);
        assert_eq!(fs.child_of(MF_ID, 0x2F00).unwrap().fid(), 0x2F00);
        assert!(fs.child_of(MF_ID, 0x5001).is_none());
    }

    #[test]
    fn test_parent_lookup() {
        let fs = sample();
        assert_eq!(fs.parent_of(0x5001).unwrap().fid(), 0x5000);
        assert_eq!(fs.parent_of(0x5000).unwrap().fid(), MF_ID);
        assert!(fs.parent_of(MF_ID).is_none());
    }

    #[test]
    fn test_add_errors() {
        let mut fs = sample();
        assert_eq!(fs.add_ef(MF_ID, 0x5000), Err(FileSystemError::DuplicateFileId(0x5000)));
        assert_eq!(fs.add_ef(MF_ID, MF_ID), Err(FileSystemError::DuplicateFileId(MF_ID)));
        assert_eq!(fs.add_df(0x1234, 0x4000), Err(FileSystemError::ParentNotFound(0x1234)));
        assert_eq!(fs.add_ef(0x2F00, 0x4000), Err(FileSystemError::ParentNotDedicated(0x2F00)));
        assert_eq!(fs.add_ef(MF_ID, 0xFFFF), Err(FileSystemError::ReservedFileId(0xFFFF)));
        assert_eq!(fs.len(), 4);
    }
}
