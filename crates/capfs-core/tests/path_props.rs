//! Property tests for path handling and the in-memory backend.

use capfs_core::path::{self, file_name, join, normalize, parent};
use capfs_core::{Basic, MemFs, OpenFlags};
use proptest::prelude::*;

fn component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-][a-zA-Z0-9_.-]{0,11}".prop_filter("dot names", |s| s != "." && s != "..")
}

proptest! {
    /// Joining valid components always yields a normalized path whose
    /// parent and file name recover the pieces.
    #[test]
    fn join_is_normalized(parts in prop::collection::vec(component(), 0..6), last in component()) {
        let mut current = String::new();
        for part in &parts {
            current = join(&current, part).unwrap();
        }
        let joined = join(&current, &last).unwrap();

        prop_assert!(path::is_normalized(&joined));
        prop_assert_eq!(normalize(&joined).unwrap(), joined.clone());
        prop_assert_eq!(parent(&joined), current.as_str());
        prop_assert_eq!(file_name(&joined), last.as_str());
    }

    /// Normalization is idempotent and never produces `..`.
    #[test]
    fn normalize_idempotent(parts in prop::collection::vec(
        prop_oneof![component(), Just(".".to_string()), Just(String::new()), Just("..".to_string())],
        0..10,
    )) {
        let raw = parts.join("/");
        if let Ok(once) = normalize(&raw) {
            prop_assert!(path::is_normalized(&once));
            prop_assert_eq!(normalize(&once).unwrap(), once);
        }
    }

    /// Whatever is written at an offset reads back unchanged.
    #[test]
    fn memfs_write_read_round_trip(
        data in prop::collection::vec(any::<u8>(), 0..512),
        offset in 0u64..256,
        positioned in any::<bool>(),
    ) {
        let fs = if positioned { MemFs::new() } else { MemFs::new().without_positioned_writes() };
        let file = fs.open_file("f", OpenFlags::READ_WRITE.with(libc::O_CREAT), 0o644).unwrap();
        match file.as_write_at() {
            Some(w) => { w.write_at(&data, offset).unwrap(); }
            None => {
                file.seek(std::io::SeekFrom::Start(offset)).unwrap();
                file.write(&data).unwrap();
            }
        }

        let mut buf = vec![0u8; data.len()];
        let n = file.read_at(&mut buf, offset).unwrap();
        prop_assert_eq!(n, data.len());
        prop_assert_eq!(buf, data.clone());

        let expected_size = if data.is_empty() { 0 } else { offset + data.len() as u64 };
        prop_assert_eq!(fs.stat("f").unwrap().size, expected_size);
    }
}
