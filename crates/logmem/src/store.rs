//! Per-COid on-disk checkpoint store (C8), grounded in
//! `diskstorage.{h,cpp}`: one file per COid, named `<cid-hex>.<oid-hex>`
//! under the node's configured store directory, holding a single
//! checkpoint tucoid. Engaged on first access of an unknown COid (§4.4.1)
//! and by `flush_to_file`/`save_individual` (§4.4.8, §6.6).
//!
//! Also hosts [`RowidAllocator`] (§2 supplemented `GetRowid` RPC): a
//! per-cid monotonically increasing counter, persisted so restarts do not
//! reuse ids, grounded in `clientdir.cpp`/`treedirect.cpp`'s per-cid rowid
//! scheme.

use dashmap::DashMap;
use gaia_core::{Coid, Error, Result};
use gaia_pendingtx::{Checkpoint, TxUpdateCoid};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const MAGIC: u32 = 0x6761_6961; // "gaia"

/// On-disk checkpoint store: one COid per file under `root`.
pub struct DiskStorage {
    root: PathBuf,
    rowids: DashMap<u64, Arc<AtomicI64>>,
}

impl DiskStorage {
    /// Opens (creating if needed) the checkpoint directory at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(DiskStorage { root, rowids: DashMap::new() })
    }

    fn filename(&self, coid: Coid) -> PathBuf {
        self.root.join(format!("{:x}.{:x}", coid.cid, coid.oid))
    }

    /// Reads the persisted checkpoint for `coid`, if a file exists for it.
    pub fn read_coid(&self, coid: Coid) -> Result<Option<Arc<TxUpdateCoid>>> {
        let path = self.filename(coid);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Some(Arc::new(decode_checkpoint(&bytes)?)))
    }

    /// Persists `tucoid` (which must carry a checkpoint, not a delta) as
    /// `coid`'s sole on-disk record.
    pub fn write_coid(&self, coid: Coid, tucoid: &TxUpdateCoid) -> Result<()> {
        let checkpoint = tucoid
            .checkpoint()
            .ok_or_else(|| Error::Serialization("disk checkpoints must carry a Write or WriteSV".into()))?;
        let bytes = encode_checkpoint(checkpoint)?;
        let path = self.filename(coid);
        let tmp = path.with_extension("tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Root directory backing this store (for admin `print`/`save`
    /// commands).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `RowidAllocator` for `cid`, loading its persisted high-water mark
    /// on first use.
    pub fn rowid_allocator(&self, cid: u64) -> RowidAllocator {
        let counter = self
            .rowids
            .entry(cid)
            .or_insert_with(|| Arc::new(AtomicI64::new(self.load_rowid_highwater(cid))))
            .clone();
        RowidAllocator { counter, store_path: self.rowid_path(cid) }
    }

    fn rowid_path(&self, cid: u64) -> PathBuf {
        self.root.join(format!("{:x}.rowid", cid))
    }

    fn load_rowid_highwater(&self, cid: u64) -> i64 {
        fs::read(self.rowid_path(cid))
            .ok()
            .and_then(|b| b.get(0..8).map(|s| i64::from_le_bytes(s.try_into().unwrap())))
            .unwrap_or(0)
    }
}

/// Encodes one checkpoint as a self-describing, checksummed record (shared
/// by [`DiskStorage::write_coid`] and [`crate::table::LogInMemory`]'s
/// multi-COid `flush_to_file`/`load_from_file`, §4.4.8).
pub(crate) fn encode_checkpoint(checkpoint: &Checkpoint) -> Result<Vec<u8>> {
    #[derive(serde::Serialize)]
    enum Wire<'a> {
        Value(&'a [u8]),
        SuperValue(&'a gaia_core::SuperValue),
    }
    let wire = match checkpoint {
        Checkpoint::Write(v) => Wire::Value(v),
        Checkpoint::WriteSv(sv) => Wire::SuperValue(sv),
    };
    let body = rmp_serde::to_vec(&wire)?;
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Inverse of [`encode_checkpoint`].
pub(crate) fn decode_checkpoint(bytes: &[u8]) -> Result<TxUpdateCoid> {
    if bytes.len() < 8 {
        return Err(Error::ChecksumMismatch { what: "COid checkpoint file" });
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(Error::ChecksumMismatch { what: "COid checkpoint file" });
    }
    let crc = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let body = &bytes[8..];
    if crc32fast::hash(body) != crc {
        return Err(Error::ChecksumMismatch { what: "COid checkpoint file" });
    }

    #[derive(serde::Deserialize)]
    enum Wire {
        Value(Vec<u8>),
        SuperValue(gaia_core::SuperValue),
    }
    let wire: Wire = rmp_serde::from_slice(body)?;
    let checkpoint = match wire {
        Wire::Value(v) => Checkpoint::Write(v),
        Wire::SuperValue(sv) => Checkpoint::WriteSv(sv),
    };
    Ok(TxUpdateCoid::from_checkpoint(checkpoint))
}

/// Per-cid monotonically increasing rowid counter (§2 `GetRowid`).
#[derive(Clone)]
pub struct RowidAllocator {
    counter: Arc<AtomicI64>,
    store_path: PathBuf,
}

impl RowidAllocator {
    /// Hands out the next unused rowid for this cid, persisting the new
    /// high-water mark so a restart does not reuse it.
    pub fn next(&self) -> Result<i64> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let tmp = self.store_path.with_extension("rowid.tmp");
        fs::write(&tmp, id.to_le_bytes())?;
        fs::rename(&tmp, &self.store_path)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::{CellType, SuperValue};

    #[test]
    fn roundtrips_a_value_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::open(dir.path()).unwrap();
        let coid = Coid::new(1, 2);
        let tucoid = TxUpdateCoid::from_checkpoint(Checkpoint::Write(b"hello".to_vec()));
        store.write_coid(coid, &tucoid).unwrap();
        let loaded = store.read_coid(coid).unwrap().unwrap();
        assert!(matches!(loaded.checkpoint(), Some(Checkpoint::Write(v)) if v == b"hello"));
    }

    #[test]
    fn roundtrips_a_supervalue_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::open(dir.path()).unwrap();
        let coid = Coid::new(1, 3);
        let sv = SuperValue::new(2, CellType::IntKey);
        let tucoid = TxUpdateCoid::from_checkpoint(Checkpoint::WriteSv(sv));
        store.write_coid(coid, &tucoid).unwrap();
        let loaded = store.read_coid(coid).unwrap().unwrap();
        assert!(matches!(loaded.checkpoint(), Some(Checkpoint::WriteSv(sv)) if sv.nattrs == 2));
    }

    #[test]
    fn unknown_coid_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStorage::open(dir.path()).unwrap();
        assert!(store.read_coid(Coid::new(9, 9)).unwrap().is_none());
    }

    #[test]
    fn rowid_allocator_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStorage::open(dir.path()).unwrap();
            let alloc = store.rowid_allocator(42);
            assert_eq!(alloc.next().unwrap(), 1);
            assert_eq!(alloc.next().unwrap(), 2);
        }
        let store2 = DiskStorage::open(dir.path()).unwrap();
        let alloc2 = store2.rowid_allocator(42);
        assert_eq!(alloc2.next().unwrap(), 3);
    }
}
