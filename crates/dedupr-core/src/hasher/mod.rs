pub mod sha256;

pub use sha256::{hash_file, hash_reader, READ_BUFFER_SIZE};
