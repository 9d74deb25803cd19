use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Largest payload a record may declare. Anything bigger is a corrupt length
/// prefix, not a booking.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Result of reading a log back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// A torn or corrupt tail was found and ignored.
    pub discarded_tail: bool,
    /// Byte length of the intact prefix of the log.
    pub valid_len: u64,
}

/// Read up to `buf.len()` bytes; `Ok(false)` on a short read at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only booking log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is dropped on replay via length-prefix + CRC check.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`. `existing_entries` is the number of
    /// records already replayed, so compaction pressure survives a restart.
    pub fn open(path: &Path, existing_entries: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: existing_entries,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Nothing is durable until `flush_sync()`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the compacted log to a sibling temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the temp file over the log and reopen for appending.
    pub fn swap_compact_file(&mut self, compacted_entries: u64) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = compacted_entries;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file(events.len() as u64)
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Cut the log back to its first `len` bytes. Appending after a torn
    /// record would hide every later record from the next replay.
    pub fn truncate(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Read every intact event. Stops at the first torn or corrupt entry.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read(&mut len_buf[..1])? {
                0 => break, // clean end
                _ => {
                    if !read_full(&mut reader, &mut len_buf[1..])? {
                        replay.discarded_tail = true;
                        break;
                    }
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_LEN {
                replay.discarded_tail = true;
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut payload)? || !read_full(&mut reader, &mut crc_buf)? {
                replay.discarded_tail = true;
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                replay.discarded_tail = true;
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    replay.events.push(event);
                    replay.valid_len += (4 + len + 4) as u64;
                }
                Err(_) => {
                    replay.discarded_tail = true;
                    break;
                }
            }
        }

        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{NaiveDate, Utc};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("otbook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn saved(start: Minutes) -> Event {
        Event::BookingSaved {
            booking: Booking {
                id: Ulid::new(),
                resource_id: "2".into(),
                date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
                interval: TimeInterval::new(start, start + 90),
                status: BookingStatus::Scheduled,
                is_emergency: false,
                needs_manual_resolution: false,
                label: None,
                created_at: Utc::now(),
                updated_at: None,
                cancelled_at: None,
            },
        }
    }

    fn audited() -> Event {
        Event::AuditAppended {
            entry: AuditEntry {
                action: AuditAction::BookingCancelled,
                booking_id: Ulid::new(),
                actor: "nurse-station".into(),
                at: Utc::now(),
                details: "patient unfit".into(),
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![saved(480), audited(), saved(600)];
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 3);
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert!(!replay.discarded_tail);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = saved(480);
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // length prefix + partial payload
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![event]);
        assert!(replay.discarded_tail);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_partial_length_prefix() {
        let path = tmp_path("partial_len.wal");
        let event = saved(480);
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8, 0]).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 1);
        assert!(replay.discarded_tail);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        {
            let payload = bincode::serialize(&audited()).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(replay.discarded_tail);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_rejects_oversized_length_prefix() {
        let path = tmp_path("oversized_len.wal");
        let event = saved(480);
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&event).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![event]);
        assert!(replay.discarded_tail);
        assert_eq!(replay.valid_len, good_len);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncate_drops_torn_tail_before_new_appends() {
        let path = tmp_path("truncate_tail.wal");
        let first = saved(480);
        let second = saved(720);
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9, 0, 0, 0, 1, 2]).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.discarded_tail);
        Wal::truncate(&path, replay.valid_len).unwrap();
        {
            let mut wal = Wal::open(&path, 1).unwrap();
            wal.append(&second).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, second]);
        assert!(!replay.discarded_tail);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_allows_appends() {
        let path = tmp_path("compact.wal");
        let keep = saved(480);
        let later = saved(720);
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for _ in 0..20 {
                wal.append(&saved(600)).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();
        {
            let mut wal = Wal::open(&path, 20).unwrap();
            wal.compact(std::slice::from_ref(&keep)).unwrap();
            assert_eq!(wal.appends_since_compact(), 1);
            wal.append(&later).unwrap();
            assert_eq!(wal.appends_since_compact(), 2);
        }
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap().events, vec![keep, later]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_visible_after_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|i| saved(480 + i * 60)).collect();
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap().events, events);
        let _ = fs::remove_file(&path);
    }
}
