#![allow(dead_code)]

pub mod fake_transmission;

pub use fake_transmission::{FakeTransmission, FakeTransmissionOptions};

use reconcile::torrent::InfoHash;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Bencoded single-file info dictionary
pub fn info_dict(name: &str, length: u64) -> Vec<u8> {
    let mut info = format!("d6:lengthi{}e4:name{}:", length, name.len()).into_bytes();
    info.extend_from_slice(name.as_bytes());
    info.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    info.extend_from_slice(&[0xAB; 20]);
    info.push(b'e');
    info
}

/// Write a .torrent file for `name`, returning its path and info hash
pub fn write_torrent(dir: &Path, file_name: &str, name: &str, length: u64) -> (PathBuf, InfoHash) {
    let info = info_dict(name, length);
    let mut data = b"d8:announce31:http://tracker.invalid/announce4:info".to_vec();
    data.extend_from_slice(&info);
    data.push(b'e');

    let path = dir.join(file_name);
    std::fs::write(&path, data).expect("Failed to write torrent");
    (path, InfoHash::of_info_dict(&info))
}

/// Create a path database with a `files(path, file)` table
pub async fn create_path_database(db_path: &Path, rows: &[(&str, &str)]) {
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&url)
        .await
        .expect("Failed to create database");

    sqlx::query("CREATE TABLE files (path TEXT NOT NULL, file TEXT NOT NULL)")
        .execute(&pool)
        .await
        .expect("Failed to create table");

    for (path, file) in rows {
        sqlx::query("INSERT INTO files (path, file) VALUES (?, ?)")
            .bind(path)
            .bind(file)
            .execute(&pool)
            .await
            .expect("Failed to insert row");
    }
    pool.close().await;
}
