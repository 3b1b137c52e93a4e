use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Size of the length prefix plus the trailing checksum.
const FRAME_OVERHEAD: u64 = 8;

/// Larger length prefixes are treated as corruption.
const MAX_RECORD_LEN: usize = 1 << 20;

fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one frame. `Ok(None)` on a clean end, a torn frame, or a bad checksum.
fn decode_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, len as u64 + FRAME_OVERHEAD))),
        Err(_) => Ok(None),
    }
}

/// `read_exact` that reports EOF as `false` instead of an error.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of reservation events.
///
/// Frame: `[u32 len][bincode Event][u32 crc32]`, little endian. On open the log
/// is replayed and anything after the last intact frame is cut off, so a torn
/// write from a crash never hides later appends.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log, returning it with every intact event.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            tracing::warn!(path = %path.display(), valid_len, "truncating torn WAL tail");
            file.set_len(valid_len)?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: events.len() as u64,
        };
        Ok((wal, events))
    }

    /// Events plus the byte length covered by intact frames.
    pub fn replay(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;
        while let Some((event, frame_len)) = decode_record(&mut reader)? {
            events.push(event);
            valid_len += frame_len;
        }
        Ok((events, valid_len))
    }

    /// Buffer an event without syncing. Follow a batch with `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events` (a snapshot of current state).
    /// Written to a sibling temp file, synced, then renamed over the log.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_record(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReservationStatus, Role, Span};
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn user_event() -> Event {
        Event::UserUpserted {
            id: Ulid::new(),
            name: "Ana".into(),
            role: Role::Employee,
            active: true,
        }
    }

    fn slot_event(id: u32) -> Event {
        Event::TimeSlotSeeded {
            id,
            span: Span::new(
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            ),
            active: true,
        }
    }

    #[test]
    fn append_and_reopen() {
        let path = tmp_path("append_reopen.wal");
        let events = vec![user_event(), slot_event(1)];
        {
            let (mut wal, replayed) = Wal::open(&path).unwrap();
            assert!(replayed.is_empty());
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        let (_wal, replayed) = Wal::open(&path).unwrap();
        assert_eq!(replayed, events);
    }

    #[test]
    fn torn_tail_is_cut_and_later_appends_survive() {
        let path = tmp_path("torn_tail.wal");
        let first = user_event();
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 6]).unwrap();
        }
        let second = slot_event(2);
        {
            let (mut wal, replayed) = Wal::open(&path).unwrap();
            assert_eq!(replayed, vec![first.clone()]);
            wal.append(&second).unwrap();
        }
        let (_wal, replayed) = Wal::open(&path).unwrap();
        assert_eq!(replayed, vec![first, second]);
    }

    #[test]
    fn bad_checksum_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let event = Event::ReservationStatusChanged {
            id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            status: ReservationStatus::Cancelled,
        };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        let (events, valid_len) = Wal::replay(&path).unwrap();
        assert!(events.is_empty());
        assert_eq!(valid_len, 0);
    }

    #[test]
    fn missing_file_replays_empty() {
        let path = tmp_path("missing.wal");
        let (events, len) = Wal::replay(&path).unwrap();
        assert!(events.is_empty());
        assert_eq!(len, 0);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let keep = slot_event(1);
        let (mut wal, _) = Wal::open(&path).unwrap();
        wal.append(&keep).unwrap();
        for _ in 0..20 {
            wal.append(&user_event()).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 21);
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let extra = slot_event(2);
        wal.append(&extra).unwrap();
        drop(wal);
        let (events, _) = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![keep, extra]);
    }
}
