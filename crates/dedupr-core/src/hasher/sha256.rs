use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Files are streamed through the digest in chunks of this size; nothing
/// larger is ever held in memory.
pub const READ_BUFFER_SIZE: usize = 1024 * 1024; // 1MB

/// Lowercase hex SHA-256 of a file's full content.
pub fn hash_file(file: &Path) -> io::Result<String> {
    let f = File::open(file)?;
    hash_reader(f)
}

pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
