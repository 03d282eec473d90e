//! Drivers that feed requests into a [`MemoryManager`]: batch files,
//! generated segments and randomized stress runs.

use std::fmt;
use std::io::Write;

use rand::Rng;

use crate::constants::*;
use crate::error::{ConfigError, VmResult};
use crate::io::TranslationLog;
use crate::page_table::{Access, Protection};
use crate::translation::{LogicalAddress, Request, Translation};
use crate::vm_manager::MemoryManager;

/// Running totals over a sequence of translations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    pub total: usize,
    pub successful: usize,
    pub page_faults: usize,
    pub total_latency: u64,
    pub successful_latency: u64,
}

impl SessionStats {
    pub fn record(&mut self, translation: &Translation) {
        self.total += 1;
        self.total_latency += u64::from(translation.latency);
        if translation.page_fault {
            self.page_faults += 1;
        }
        if translation.is_ok() {
            self.successful += 1;
            self.successful_latency += u64::from(translation.latency);
        }
    }

    pub fn faults(&self) -> usize {
        self.total - self.successful
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful as f64, self.total) * 100.0
    }

    pub fn fault_rate(&self) -> f64 {
        ratio(self.faults() as f64, self.total) * 100.0
    }

    /// Mean latency over every request
    pub fn average_latency(&self) -> f64 {
        ratio(self.total_latency as f64, self.total)
    }

    /// Mean latency over successful requests only
    pub fn average_success_latency(&self) -> f64 {
        ratio(self.successful_latency as f64, self.successful)
    }
}

fn ratio(value: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { value / count as f64 }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Translations: {}", self.total)?;
        writeln!(f, "Successful: {}", self.successful)?;
        writeln!(f, "Faults/Errors: {}", self.faults())?;
        writeln!(f, "Page Faults Resolved: {}", self.page_faults)?;
        if self.total > 0 {
            writeln!(f, "Success Rate: {:.2}%", self.success_rate())?;
            write!(f, "Average Latency: {:.2}", self.average_latency())?;
        }
        Ok(())
    }
}

/// Console line for one served request
pub fn describe(request: &Request, translation: &Translation) -> String {
    format!("Time {}: Logical {} -> {}", translation.time, request.address, translation)
}

/// Translate every request once, echoing each result to `console` and,
/// when given, appending a row to `csv`.
pub fn run_batch<C: Write, W: Write>(
    manager: &mut MemoryManager,
    requests: &[Request],
    console: &mut C,
    mut csv: Option<&mut TranslationLog<W>>,
) -> VmResult<SessionStats> {
    let mut stats = SessionStats::default();
    for request in requests {
        let translation = manager.translate_request(request);
        stats.record(&translation);
        writeln!(console, "{}", describe(request, &translation))?;
        if let Some(csv) = csv.as_deref_mut() {
            csv.record(request, &translation)?;
        }
    }
    Ok(stats)
}

/// Register segments `0..count`, each with the default random geometry and
/// a protection drawn uniformly from `rng`.
pub fn initialize_random_segments<R: Rng + ?Sized>(
    manager: &mut MemoryManager,
    count: u32,
    rng: &mut R,
) -> Result<(), ConfigError> {
    log::info!(
        "initializing {} segments with {} directory entries and {} page table entries",
        count,
        RANDOM_DIR_ENTRIES,
        RANDOM_TABLE_ENTRIES
    );
    for id in 0..count {
        let protection = if rng.random_bool(0.5) {
            Protection::ReadOnly
        } else {
            Protection::ReadWrite
        };
        manager.add_segment(
            id,
            0,
            RANDOM_DIR_ENTRIES,
            protection,
            RANDOM_DIR_ENTRIES,
            RANDOM_TABLE_ENTRIES,
        )?;
    }
    Ok(())
}

/// Draw a request against the manager's current layout.
///
/// With probability `valid_ratio` every coordinate is in range; otherwise one
/// coordinate is pushed just past its bound. Returns `None` when no segment
/// with a provisioned table exists.
pub fn random_request<R: Rng + ?Sized>(
    manager: &MemoryManager,
    rng: &mut R,
    valid_ratio: f64,
) -> Option<Request> {
    let segments: Vec<u32> = manager
        .segments()
        .map(|s| s.id)
        .filter(|&id| manager.directory(id).is_some_and(|d| !d.is_empty()))
        .collect();
    if segments.is_empty() {
        return None;
    }
    let segment = segments[rng.random_range(0..segments.len())];
    let directory = manager.directory(segment)?;
    let indices: Vec<usize> = directory.indices().collect();
    let index = indices[rng.random_range(0..indices.len())];
    let table = manager.table(directory.get_table(index)?)?;

    let mut address = LogicalAddress::new(
        i64::from(segment),
        index as i64,
        rng.random_range(0..table.len()) as i64,
        rng.random_range(0..table.page_size()) as i64,
    );
    let access = if rng.random_bool(0.5) { Access::Write } else { Access::Read };

    if !rng.random_bool(valid_ratio.clamp(0.0, 1.0)) {
        match rng.random_range(0..4) {
            0 => address.segment = manager.segments().map(|s| i64::from(s.id)).max().unwrap_or(0) + 1,
            1 => address.directory = indices.last().map_or(0, |&i| i as i64) + 1,
            2 => address.page = table.len() as i64,
            _ => address.offset = table.page_size() as i64,
        }
    }
    Some(Request::new(address, access))
}

/// Summary of a stress run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressReport {
    pub stats: SessionStats,
    pub utilization: f64,
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Stress Test Metrics ---")?;
        writeln!(f, "Page Fault/Error Rate: {:.2}%", self.stats.fault_rate())?;
        writeln!(f, "Average Translation Latency: {:.2}", self.stats.average_success_latency())?;
        write!(f, "Final Memory Utilization: {:.2}%", self.utilization)
    }
}

/// Serve `count` random requests, logging each to `csv`, and append the
/// metrics trailer to it.
pub fn stress_test<R: Rng + ?Sized, W: Write>(
    manager: &mut MemoryManager,
    count: usize,
    valid_ratio: f64,
    rng: &mut R,
    mut csv: TranslationLog<W>,
) -> VmResult<StressReport> {
    let mut stats = SessionStats::default();
    for _ in 0..count {
        let Some(request) = random_request(manager, rng, valid_ratio) else {
            log::warn!("no segment with a page table to draw requests from");
            break;
        };
        let translation = manager.translate_request(&request);
        stats.record(&translation);
        csv.record(&request, &translation)?;
    }

    let report = StressReport { stats, utilization: manager.utilization() };
    let trailer: Vec<String> = report.to_string().lines().map(str::to_owned).collect();
    csv.finish(&trailer)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::io::parse_batch;
    use crate::memory::ReplacementPolicy;
    use crate::vm_manager::ManagerConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn manager(frames: usize) -> MemoryManager {
        MemoryManager::new(ManagerConfig::new(frames, 16, ReplacementPolicy::Lru).with_seed(11)).unwrap()
    }

    #[test]
    fn test_session_stats() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.average_latency(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);

        let ok = Translation { result: Ok(3), latency: 104, time: 1, page_fault: true, evicted: None };
        let bad = Translation {
            result: Err(Fault::ReplacementFailure),
            latency: 2,
            time: 2,
            page_fault: false,
            evicted: None,
        };
        stats.record(&ok);
        stats.record(&bad);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.faults(), 1);
        assert_eq!(stats.page_faults, 1);
        assert_eq!(stats.success_rate(), 50.0);
        assert_eq!(stats.average_latency(), 53.0);
        assert_eq!(stats.average_success_latency(), 104.0);
        assert!(stats.to_string().contains("Success Rate: 50.00%"));
    }

    #[test]
    fn test_run_batch() {
        let mut mm = manager(2);
        mm.add_segment(0, 0, 1, Protection::ReadWrite, 1, 4).unwrap();
        let requests = parse_batch("0 0 0 1 0\n0 0 0 2 1\n7 0 0 0 0\n");

        let mut console = Vec::new();
        let mut csv_log = TranslationLog::new(Vec::new()).unwrap();
        let stats = run_batch(&mut mm, &requests, &mut console, Some(&mut csv_log)).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.page_faults, 1);

        let console = String::from_utf8(console).unwrap();
        let lines: Vec<&str> = console.lines().collect();
        assert!(lines[0].starts_with("Time 1: Logical (0,0,0,1) -> Physical 1 (Latency: 10"));
        assert!(lines[1].starts_with("Time 2: Logical (0,0,0,2) -> Physical 2"));
        assert!(lines[2].starts_with("Time 3: Logical (7,0,0,0) -> FAULT (Segmentation Fault"));

        let csv = String::from_utf8(csv_log.finish(&[]).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn test_run_batch_without_log() {
        let mut mm = manager(2);
        mm.add_segment(0, 0, 1, Protection::ReadWrite, 1, 4).unwrap();
        let mut console = Vec::new();
        let stats =
            run_batch::<_, Vec<u8>>(&mut mm, &parse_batch("0 0 3 0 0"), &mut console, None).unwrap();
        assert_eq!(stats.successful, 1);
    }

    #[test]
    fn test_initialize_random_segments() {
        let mut mm = manager(4);
        let mut rng = StdRng::seed_from_u64(5);
        initialize_random_segments(&mut mm, 3, &mut rng).unwrap();

        assert_eq!(mm.segment_count(), 3);
        for id in 0..3 {
            let dir = mm.directory(id).unwrap();
            assert_eq!(dir.len(), RANDOM_DIR_ENTRIES);
            let table = mm.table(dir.get_table(0).unwrap()).unwrap();
            assert_eq!(table.len(), RANDOM_TABLE_ENTRIES);
        }
        // generating again collides with the existing ids
        let err = initialize_random_segments(&mut mm, 1, &mut rng).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateSegment(0));
    }

    #[test]
    fn test_random_request_bounds() {
        let mut mm = manager(4);
        let mut rng = StdRng::seed_from_u64(9);
        assert!(random_request(&mm, &mut rng, 1.0).is_none());

        mm.add_segment(0, 0, 2, Protection::ReadWrite, 2, 4).unwrap();
        mm.add_segment(1, 0, 0, Protection::ReadWrite, 0, 4).unwrap();
        for _ in 0..200 {
            let r = random_request(&mm, &mut rng, 1.0).unwrap();
            assert_eq!(r.address.segment, 0);
            assert!((0..2).contains(&r.address.directory));
            assert!((0..4).contains(&r.address.page));
            assert!((0..16).contains(&r.address.offset));
        }
        for _ in 0..50 {
            let r = random_request(&mm, &mut rng, 0.0).unwrap();
            let a = r.address;
            assert!(a.segment == 2 || a.directory == 2 || a.page == 4 || a.offset == 16, "{}", a);
        }
    }

    #[test]
    fn test_stress_test_report() {
        let mut mm = manager(4);
        let mut rng = StdRng::seed_from_u64(21);
        initialize_random_segments(&mut mm, 2, &mut rng).unwrap();

        let csv = TranslationLog::new(Vec::new()).unwrap();
        let report = stress_test(&mut mm, 50, STRESS_VALID_RATIO, &mut rng, csv).unwrap();

        assert_eq!(report.stats.total, 50);
        assert!((0.0..=100.0).contains(&report.stats.fault_rate()));
        assert!((0.0..=100.0).contains(&report.utilization));
        assert_eq!(mm.now(), 50);
        assert!(report.to_string().starts_with("--- Stress Test Metrics ---"));
    }

    #[test]
    fn test_stress_test_is_reproducible() {
        let run = || {
            let mut mm = manager(3);
            let mut rng = StdRng::seed_from_u64(77);
            initialize_random_segments(&mut mm, 3, &mut rng).unwrap();
            let csv = TranslationLog::new(Vec::new()).unwrap();
            let report = stress_test(&mut mm, 40, 0.7, &mut rng, csv).unwrap();
            (report, mm.snapshot())
        };
        assert_eq!(run(), run());
    }
}
