//! The flat single-level filesystem: free map, inodes, directory, open
//! files, and the `Filesys` entry point.

pub mod directory;
pub mod file;
pub mod filesys;
pub mod free_map;
pub mod inode;

pub use file::File;
pub use filesys::Filesys;
