//! `LogInMemory`: the COid-keyed table of [`LogOneObjectInMemory`]
//! instances, lazily populated on first access (§4.4.1), grounded in
//! `logmem.{h,cpp}`'s `LogInMemory::getAndLock`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use gaia_core::{Coid, Error, Result, Ts};
use gaia_pendingtx::{Checkpoint, TxUpdateCoid};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::LogConfig;
use crate::looim::LogOneObjectInMemory;
use crate::readoutcome::ReadOutcome;
use crate::store::{decode_checkpoint, encode_checkpoint, DiskStorage};

/// Process-wide table of per-COid logs, backed by `DiskStorage` for
/// first-touch loading and explicit flush/save.
pub struct LogInMemory {
    objects: DashMap<Coid, Arc<LogOneObjectInMemory>>,
    disk: DiskStorage,
    single_version: bool,
}

impl LogInMemory {
    /// Builds an empty table backed by the given disk checkpoint store.
    pub fn new(disk: DiskStorage) -> Self {
        LogInMemory { objects: DashMap::new(), disk, single_version: false }
    }

    /// Sets whether `write` retains only the latest checkpoint per COid
    /// (§4.4.3). See `DESIGN.md` for the interaction with deferred readers.
    pub fn set_single_version(&mut self, single_version: bool) {
        self.single_version = single_version;
    }

    /// True if single-version mode is active.
    pub fn single_version(&self) -> bool {
        self.single_version
    }

    /// The disk checkpoint store backing this table (for admin `save`/
    /// `load`/`print` and `GetRowid`).
    pub fn disk(&self) -> &DiskStorage {
        &self.disk
    }

    /// Looks up (or lazily creates) the log for `coid` (§4.4.1). If the
    /// object doesn't exist yet and `create_first` is true, it is seeded
    /// from disk if a checkpoint exists there, else from an empty `Value`
    /// at `Ts::lowest()`. If it doesn't exist and `create_first` is false,
    /// returns `None`.
    pub fn get_and_lock(&self, coid: Coid, create_first: bool) -> Result<Option<Arc<LogOneObjectInMemory>>> {
        if let Some(existing) = self.objects.get(&coid) {
            return Ok(Some(Arc::clone(&existing)));
        }
        if !create_first {
            return Ok(None);
        }
        let looim = match self.disk.read_coid(coid)? {
            Some(tucoid) => Arc::new(LogOneObjectInMemory::new_with_checkpoint(Ts::lowest(), tucoid)),
            None => Arc::new(LogOneObjectInMemory::new_with_checkpoint(
                Ts::lowest(),
                Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(Vec::new()))),
            )),
        };
        match self.objects.entry(coid) {
            dashmap::mapref::entry::Entry::Occupied(e) => Ok(Some(Arc::clone(e.get()))),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::clone(&looim));
                Ok(Some(looim))
            }
        }
    }

    /// Every resident COid (for admin `print`/status reporting).
    pub fn resident_coids(&self) -> Vec<Coid> {
        self.objects.iter().map(|e| *e.key()).collect()
    }

    /// Drops `coid` from memory without touching its on-disk checkpoint;
    /// the next `get_and_lock` reloads it from disk (admin `load_individual`,
    /// §6.6).
    pub fn evict(&self, coid: Coid) {
        self.objects.remove(&coid);
    }

    /// Number of COids currently resident in memory.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if no COid is resident.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// §4.4.8 `flush_to_file`: snapshot-reads every resident COid at `ts`
    /// and writes `{COid header, type tag, checkpoint body}` records to
    /// `filename`, one file for the whole table (distinct from
    /// `DiskStorage`'s per-COid `save_individual`/`load_individual` files,
    /// §6.6's `save`/`load` vs `save_individual`/`load_individual`
    /// commands).
    pub fn flush_to_file(&self, ts: Ts, filename: impl AsRef<Path>, cfg: &LogConfig) -> Result<()> {
        let mut out = BufWriter::new(File::create(filename.as_ref())?);
        for coid in self.resident_coids() {
            let looim = match self.get_and_lock(coid, false)? {
                Some(l) => l,
                None => continue,
            };
            let tucoid = match looim.read(ts, None, cfg)? {
                ReadOutcome::Found { tucoid, .. } => tucoid,
                ReadOutcome::Deferred => continue,
            };
            let checkpoint = match tucoid.checkpoint() {
                Some(c) => c,
                None => continue,
            };
            write_record(&mut out, coid, checkpoint)?;
        }
        out.flush()?;
        Ok(())
    }

    /// §4.4.8 `load_from_file`: reads records written by
    /// [`Self::flush_to_file`] and calls `write(coid, now, tucoid)` for
    /// each, installing them as the latest checkpoint for that COid.
    pub fn load_from_file(&self, filename: impl AsRef<Path>, cfg: &LogConfig) -> Result<usize> {
        let mut input = BufReader::new(File::open(filename.as_ref())?);
        let mut count = 0;
        while let Some((coid, checkpoint)) = read_record(&mut input)? {
            let tucoid = Arc::new(TxUpdateCoid::from_checkpoint(checkpoint));
            let looim = self
                .get_and_lock(coid, true)?
                .expect("get_and_lock(create_first=true) always returns Some");
            looim.write(Ts::new(), tucoid, self.single_version, cfg);
            count += 1;
        }
        Ok(count)
    }
}

fn write_record(out: &mut impl Write, coid: Coid, checkpoint: &Checkpoint) -> Result<()> {
    let body = encode_checkpoint(checkpoint)?;
    out.write_u64::<LittleEndian>(coid.cid)?;
    out.write_u64::<LittleEndian>(coid.oid)?;
    out.write_u64::<LittleEndian>(body.len() as u64)?;
    out.write_all(&body)?;
    Ok(())
}

fn read_record(input: &mut impl Read) -> Result<Option<(Coid, Checkpoint)>> {
    let mut header = [0u8; 24];
    match input.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }
    let mut cur = &header[..];
    let cid = cur.read_u64::<LittleEndian>()?;
    let oid = cur.read_u64::<LittleEndian>()?;
    let body_len = cur.read_u64::<LittleEndian>()? as usize;
    let mut body = vec![0u8; body_len];
    input.read_exact(&mut body)?;
    let tucoid = decode_checkpoint(&body)?;
    let checkpoint = tucoid
        .checkpoint()
        .cloned()
        .ok_or_else(|| Error::Serialization("flush_to_file record missing a checkpoint".into()))?;
    Ok(Some((Coid::new(cid, oid), checkpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_with_create_first_synthesizes_empty_value() {
        let dir = tempfile::tempdir().unwrap();
        let table = LogInMemory::new(DiskStorage::open(dir.path()).unwrap());
        let coid = Coid::new(0, 1);
        let looim = table.get_and_lock(coid, true).unwrap().unwrap();
        match looim.read(Ts::illegal(), None, &LogConfig::default()).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v.is_empty()));
            }
            _ => panic!("expected Found"),
        }
    }

    #[test]
    fn unknown_coid_without_create_first_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let table = LogInMemory::new(DiskStorage::open(dir.path()).unwrap());
        assert!(table.get_and_lock(Coid::new(0, 1), false).unwrap().is_none());
    }

    #[test]
    fn repeated_access_returns_the_same_object() {
        let dir = tempfile::tempdir().unwrap();
        let table = LogInMemory::new(DiskStorage::open(dir.path()).unwrap());
        let coid = Coid::new(0, 1);
        let a = table.get_and_lock(coid, true).unwrap().unwrap();
        let b = table.get_and_lock(coid, true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn flush_to_file_then_load_from_file_round_trips_every_resident_coid() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogConfig::default();
        let table = LogInMemory::new(DiskStorage::open(dir.path().join("store")).unwrap());

        let value_coid = Coid::new(1, 1);
        let looim = table.get_and_lock(value_coid, true).unwrap().unwrap();
        looim.write(Ts::new(), Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(b"flushed".to_vec()))), false, &cfg);

        let sv_coid = Coid::new(2, 2);
        let sv = gaia_core::SuperValue::new(1, gaia_core::CellType::IntKey);
        let looim = table.get_and_lock(sv_coid, true).unwrap().unwrap();
        looim.write(Ts::new(), Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::WriteSv(sv))), false, &cfg);

        let file = dir.path().join("snapshot.gaia");
        table.flush_to_file(Ts::illegal(), &file, &cfg).unwrap();

        let fresh = LogInMemory::new(DiskStorage::open(dir.path().join("store2")).unwrap());
        let loaded = fresh.load_from_file(&file, &cfg).unwrap();
        assert_eq!(loaded, 2);

        let looim = fresh.get_and_lock(value_coid, false).unwrap().unwrap();
        match looim.read(Ts::illegal(), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v == b"flushed"));
            }
            _ => panic!("expected Found"),
        }

        let looim = fresh.get_and_lock(sv_coid, false).unwrap().unwrap();
        match looim.read(Ts::illegal(), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::WriteSv(sv)) if sv.nattrs == 1));
            }
            _ => panic!("expected Found"),
        }
    }
}
