#![allow(dead_code)]

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::{env, fs};

static NEXT_FIXTURE: AtomicU32 = AtomicU32::new(0);

/// Scratch directory for herd config fixtures, removed on drop. The
/// process id plus a counter keeps parallel tests from colliding.
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(label: &str) -> std::io::Result<Self> {
        let unique = format!("locus-{}-{}-{}", label, std::process::id(), NEXT_FIXTURE.fetch_add(1, Ordering::Relaxed));
        let root = env::temp_dir().join(unique);
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write a YAML document into the directory and hand back its path.
    pub fn write_config(&self, name: &str, text: &str) -> std::io::Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, text)?;
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for ConfigDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// Reserve `n` distinct loopback ports by binding ephemeral listeners,
/// then releasing them just before the caller binds for real.
pub fn free_ports(n: usize) -> Vec<u16> {
    let listeners: Vec<TcpListener> =
        (0..n).map(|_| TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port")).collect();
    listeners.iter().map(|l| l.local_addr().expect("local addr").port()).collect()
}
