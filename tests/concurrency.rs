use bitcask_kv::Store;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_writers_to_distinct_keys_all_land() -> bitcask_kv::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(Store::open(dir.path())?);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("t{t}-k{i}");
                    store.set(key.as_bytes(), b"v").expect("set");
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    for t in 0..8 {
        for i in 0..50 {
            let key = format!("t{t}-k{i}");
            assert_eq!(store.get(key.as_bytes())?, Some(b"v".to_vec()));
        }
    }

    Ok(())
}

#[test]
fn readers_do_not_block_each_other() -> bitcask_kv::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(Store::open(dir.path())?);
    store.set(b"shared", b"value")?;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(
                        store.get(b"shared").expect("get"),
                        Some(b"value".to_vec())
                    );
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    Ok(())
}
