use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::*;
use crate::error::{VmError, VmResult};
use crate::page_table::{Access, Protection};
use crate::translation::{LogicalAddress, Request, Translation};
use crate::vm_manager::MemoryManager;

/// One segment line from a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    pub id: u32,
    pub directory_entries: usize,
    pub table_entries: usize,
    pub protection: Protection,
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Read the first `N` whitespace-separated tokens of `line` as numbers.
/// Trailing tokens are ignored.
fn leading_fields<const N: usize>(line: &str) -> Option<[i64; N]> {
    let mut tokens = line.split_whitespace();
    let mut fields = [0i64; N];
    for field in fields.iter_mut() {
        *field = tokens.next()?.parse().ok()?;
    }
    Some(fields)
}

impl SegmentConfig {
    /// Parse `segmentId directoryEntries tableEntries protectionFlag`
    pub fn parse(line: &str) -> Option<Self> {
        let [id, dirs, pages, flag] = leading_fields::<4>(line)?;
        Some(SegmentConfig {
            id: u32::try_from(id).ok()?,
            directory_entries: usize::try_from(dirs).ok()?,
            table_entries: usize::try_from(pages).ok()?,
            protection: Protection::from_flag(flag),
        })
    }
}

/// Parse a configuration file body. Malformed lines are skipped with a warning.
pub fn parse_config(content: &str) -> Vec<SegmentConfig> {
    let mut segments = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if is_skippable(line) {
            continue;
        }
        match SegmentConfig::parse(line) {
            Some(segment) => segments.push(segment),
            None => log::warn!("skipping malformed line {} in config file", n + 1),
        }
    }
    segments
}

/// Register every configured segment with `manager`, returning how many were added.
///
/// Segments the manager rejects are skipped with a warning; the segment limit
/// is set to the directory size and the base to zero.
pub fn apply_config(manager: &mut MemoryManager, segments: &[SegmentConfig]) -> usize {
    let mut loaded = 0;
    for s in segments {
        match manager.add_segment(
            s.id,
            0,
            s.directory_entries,
            s.protection,
            s.directory_entries,
            s.table_entries,
        ) {
            Ok(()) => loaded += 1,
            Err(e) => log::warn!("skipping segment {}: {}", s.id, e),
        }
    }
    loaded
}

pub fn load_config<P: AsRef<Path>>(manager: &mut MemoryManager, path: P) -> VmResult<usize> {
    let content = read_file(path.as_ref())?;
    let loaded = apply_config(manager, &parse_config(&content));
    log::info!("loaded {} segments from {}", loaded, path.as_ref().display());
    Ok(loaded)
}

/// Parse `segment directoryIndex pageNumber offset access` (access 0 = read, 1 = write)
pub fn parse_request(line: &str) -> Option<Request> {
    let [s, d, p, o, flag] = leading_fields::<5>(line)?;
    let access = Access::from_flag(flag)?;
    Some(Request::new(LogicalAddress::new(s, d, p, o), access))
}

/// Parse a batch file body. Malformed lines are skipped with a warning.
pub fn parse_batch(content: &str) -> Vec<Request> {
    let mut requests = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if is_skippable(line) {
            continue;
        }
        match parse_request(line) {
            Some(request) => requests.push(request),
            None => log::warn!("skipping malformed line {} in batch file", n + 1),
        }
    }
    requests
}

pub fn read_batch<P: AsRef<Path>>(path: P) -> VmResult<Vec<Request>> {
    Ok(parse_batch(&read_file(path.as_ref())?))
}

fn read_file(path: &Path) -> VmResult<String> {
    fs::read_to_string(path).map_err(|source| VmError::Read { path: path.to_path_buf(), source })
}

/// CSV log of translations: `Time,LogicalAddress,Access,Status,PhysicalAddress,Latency`.
///
/// Fault rows carry the fault text in the `PhysicalAddress` column.
pub struct TranslationLog<W: Write> {
    out: W,
}

impl TranslationLog<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> VmResult<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|source| VmError::Write { path: path.to_path_buf(), source })?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> TranslationLog<W> {
    /// Wrap `out` and write the header row
    pub fn new(mut out: W) -> VmResult<Self> {
        writeln!(out, "{}", CSV_HEADER)?;
        Ok(TranslationLog { out })
    }

    pub fn record(&mut self, request: &Request, translation: &Translation) -> VmResult<()> {
        writeln!(
            self.out,
            "{},\"{}\",{},{},{},{}",
            translation.time,
            request.address,
            request.access,
            translation.status(),
            translation.outcome_text(),
            translation.latency
        )?;
        Ok(())
    }

    /// Append free-form trailer lines after a blank separator
    pub fn finish(mut self, trailer: &[String]) -> VmResult<W> {
        if !trailer.is_empty() {
            writeln!(self.out)?;
            for line in trailer {
                writeln!(self.out, "{}", line)?;
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Fault, ProtectionScope};
    use crate::memory::ReplacementPolicy;
    use crate::vm_manager::ManagerConfig;

    fn manager() -> MemoryManager {
        MemoryManager::new(ManagerConfig::new(4, 16, ReplacementPolicy::Fifo).with_seed(3)).unwrap()
    }

    // =========================================================================
    // Config files
    // =========================================================================

    #[test]
    fn test_parse_config_skips_comments_and_malformed() {
        let content = "# id dirs pages prot\n\
                       0 4 16 1\n\
                       \n\
                       1 2 8 0\n\
                       2 two 8 1\n\
                       3 1 4\n\
                       -4 1 4 1\n\
                       5 1 4 1 trailing\n";
        let segments = parse_config(content);
        assert_eq!(
            segments,
            vec![
                SegmentConfig { id: 0, directory_entries: 4, table_entries: 16, protection: Protection::ReadWrite },
                SegmentConfig { id: 1, directory_entries: 2, table_entries: 8, protection: Protection::ReadOnly },
                SegmentConfig { id: 5, directory_entries: 1, table_entries: 4, protection: Protection::ReadWrite },
            ]
        );
    }

    #[test]
    fn test_apply_config_skips_duplicates() {
        let mut mm = manager();
        let segments = parse_config("0 2 4 1\n0 3 4 0\n1 1 4 0\n");
        assert_eq!(apply_config(&mut mm, &segments), 2);

        let seg0 = mm.segment(0).unwrap();
        assert_eq!((seg0.base, seg0.limit, seg0.protection), (0, 2, Protection::ReadWrite));
        assert_eq!(mm.directory(0).unwrap().len(), 2);
        assert_eq!(mm.segment(1).unwrap().protection, Protection::ReadOnly);
    }

    #[test]
    fn test_load_config_missing_file() {
        let mut mm = manager();
        let err = load_config(&mut mm, "/nonexistent/config.txt").unwrap_err();
        assert!(matches!(err, VmError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/config.txt"));
    }

    // =========================================================================
    // Batch files
    // =========================================================================

    #[test]
    fn test_parse_request() {
        let r = parse_request("1 2 3 15 1").unwrap();
        assert_eq!(r.address, LogicalAddress::new(1, 2, 3, 15));
        assert_eq!(r.access, Access::Write);
        assert_eq!(parse_request("-1 0 0 0 0").unwrap().address.segment, -1);
        assert_eq!(parse_request("1 2 3 15"), None);
        assert_eq!(parse_request("1 2 3 15 2"), None);
        assert_eq!(parse_request("a b c d e"), None);
    }

    #[test]
    fn test_parse_batch() {
        let content = "# seg dir page offset access\n0 0 1 5 0\nbogus\n\n0 1 2 3 1\n";
        let requests = parse_batch(content);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].access, Access::Write);
    }

    // =========================================================================
    // Translation log
    // =========================================================================

    #[test]
    fn test_translation_log_rows() {
        let mut mm = manager();
        mm.add_segment(0, 0, 1, Protection::ReadOnly, 1, 4).unwrap();

        let ok = parse_request("0 0 1 5 0").unwrap();
        let bad = parse_request("0 0 1 5 1").unwrap();
        let t_ok = mm.translate_request(&ok);
        let t_bad = mm.translate_request(&bad);
        assert_eq!(t_bad.fault(), Some(Fault::ProtectionViolation { scope: ProtectionScope::Segment }));

        let mut log = TranslationLog::new(Vec::new()).unwrap();
        log.record(&ok, &t_ok).unwrap();
        log.record(&bad, &t_bad).unwrap();
        let bytes = log.finish(&["Final Memory Utilization: 25.00%".to_string()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], format!("1,\"(0,0,1,5)\",Read,OK,5,{}", t_ok.latency));
        assert!(lines[2].starts_with("2,\"(0,0,1,5)\",Write,FAULT,Protection Violation"));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Final Memory Utilization: 25.00%");
    }
}
