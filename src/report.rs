//! Console rendering of benchmark results.
//!
//! Pure presentation: everything here reads finished [`AggregateReport`]s and
//! the [`ComparisonTable`]; nothing feeds back into measurement.

use crate::{
    benchmark::BenchmarkRun,
    results::{AggregateReport, ComparisonTable, SkippedCandidate, Winner},
    utils::{
        format_duration, format_latency_ms, format_memory_mb, format_request_rate,
        format_table_row, format_table_separator,
    },
};
use colored::*;
use std::fmt::Write;
use std::time::Duration;

const SUMMARY_HEADERS: [&str; 10] = [
    "Candidate", "Req/s", "Avg", "p50", "p95", "p99", "Failed", "Avg Mem", "Peak Mem", "Avg CPU",
];
const SUMMARY_WIDTHS: [usize; 10] = [14, 14, 10, 10, 10, 10, 7, 10, 10, 8];

/// Detailed block for one candidate.
pub fn render_candidate(report: &AggregateReport) -> String {
    let r = &report.requests;
    let l = &r.latency;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} (pid {}, {})",
        report.name.bold(),
        report.pid,
        report.process_name
    );
    let _ = writeln!(
        out,
        "  Requests:    {} completed, {} failed in {}",
        r.requests_completed,
        r.requests_failed,
        format_duration(Duration::from_secs_f64(r.duration_sec.max(0.0)))
    );
    let _ = writeln!(out, "  Throughput:  {}", format_request_rate(r.rps));
    let _ = writeln!(
        out,
        "  Latency:     avg {} | median {} | min {} | max {}",
        format_latency_ms(l.avg),
        format_latency_ms(l.median),
        format_latency_ms(l.min),
        format_latency_ms(l.max)
    );
    let _ = writeln!(
        out,
        "  Percentiles: p50 {} | p90 {} | p95 {} | p99 {}",
        format_latency_ms(l.p50),
        format_latency_ms(l.p90),
        format_latency_ms(l.p95),
        format_latency_ms(l.p99)
    );

    if let Some(initial) = report.initial_memory_mb {
        let _ = writeln!(out, "  Initial Mem: {}", format_memory_mb(initial));
    }
    match &report.resources {
        Some(res) => {
            let _ = writeln!(
                out,
                "  Memory:      avg {} | peak {}",
                format_memory_mb(res.avg_memory),
                format_memory_mb(res.peak_memory)
            );
            let _ = writeln!(
                out,
                "  CPU:         avg {:.1}% | max {:.1}%",
                res.avg_cpu, res.max_cpu
            );
            let _ = writeln!(
                out,
                "  Threads:     {:.0} avg over {} samples",
                res.avg_threads, res.sample_count
            );
            let _ = writeln!(
                out,
                "  Efficiency:  {:.2} req/s per CPU% | {:.2} req/s per MB",
                report.efficiency.rps_per_cpu_point, report.efficiency.rps_per_mb
            );
        }
        None => {
            let _ = writeln!(out, "  Resources:   no samples collected");
        }
    }

    if !r.errors.is_empty() {
        let breakdown: Vec<String> = r
            .errors
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        let _ = writeln!(out, "  Errors:      {}", breakdown.join(", ").yellow());
    }
    out
}

/// Fixed-width summary table plus the winners, speedup and skipped sections.
pub fn render_summary(run: &BenchmarkRun) -> String {
    let mut out = String::new();

    if !run.reports.is_empty() {
        let separator = format_table_separator(&SUMMARY_WIDTHS);
        let _ = writeln!(out, "{}", separator);
        let _ = writeln!(out, "{}", format_table_row(&SUMMARY_HEADERS, &SUMMARY_WIDTHS));
        let _ = writeln!(out, "{}", separator);
        for report in &run.reports {
            let cells = summary_cells(report);
            let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
            let _ = writeln!(out, "{}", format_table_row(&refs, &SUMMARY_WIDTHS));
        }
        let _ = writeln!(out, "{}", separator);
        out.push('\n');
        out.push_str(&render_winners(&run.comparison));
        out.push_str(&render_speedups(&run.comparison));
    } else {
        let _ = writeln!(out, "{}", "No candidate produced results.".red());
    }

    out.push_str(&render_skipped(&run.skipped));
    out
}

fn summary_cells(report: &AggregateReport) -> Vec<String> {
    let l = &report.requests.latency;
    let (avg_mem, peak_mem, avg_cpu) = match &report.resources {
        Some(r) => (
            format_memory_mb(r.avg_memory),
            format_memory_mb(r.peak_memory),
            format!("{:.1}%", r.avg_cpu),
        ),
        None => ("n/a".to_string(), "n/a".to_string(), "n/a".to_string()),
    };
    vec![
        report.name.clone(),
        format!("{:.2}", report.rps()),
        format_latency_ms(l.avg),
        format_latency_ms(l.p50),
        format_latency_ms(l.p95),
        format_latency_ms(l.p99),
        report.requests.requests_failed.to_string(),
        avg_mem,
        peak_mem,
        avg_cpu,
    ]
}

fn render_winners(table: &ComparisonTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Winners".bold());

    out.push_str(&winner_line("Best throughput:", &table.best_throughput, format_request_rate));
    out.push_str(&winner_line("Best latency:", &table.best_latency, |v| {
        format!("{} avg", format_latency_ms(v))
    }));
    out.push_str(&winner_line("Best memory:", &table.best_memory, |v| {
        format!("{} avg", format_memory_mb(v))
    }));
    out
}

fn winner_line(label: &str, winner: &Option<Winner>, value: impl Fn(f64) -> String) -> String {
    match winner {
        Some(w) => format!("  {:<17}{} ({})\n", label, w.name.green(), value(w.value)),
        None => format!("  {:<17}n/a\n", label),
    }
}

fn render_speedups(table: &ComparisonTable) -> String {
    if table.speedups.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", format!("Speedup vs {}", table.baseline).bold());
    for entry in &table.speedups {
        let _ = writeln!(out, "  {:<16}{}", format!("{}:", entry.name), entry.verdict);
    }
    out
}

fn render_skipped(skipped: &[SkippedCandidate]) -> String {
    if skipped.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", "Skipped".bold());
    for s in skipped {
        let _ = writeln!(out, "  {} [{}]: {}", s.name.yellow(), s.kind, s.reason);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{RequestOutcome, RequestSummary, ResourceSample};
    use crate::results::compare;

    fn report(name: &str, latency_ms: u64, count: usize, memory: Option<f64>) -> AggregateReport {
        let outcomes = vec![RequestOutcome::succeeded(Duration::from_millis(latency_ms)); count];
        let summary = RequestSummary::from_outcomes(&outcomes, Duration::from_secs(1));
        let samples: Vec<ResourceSample> = memory
            .into_iter()
            .map(|m| ResourceSample {
                cpu_percent: 25.0,
                memory_mb: m,
                thread_count: 2,
            })
            .collect();
        AggregateReport::new(name, name, 7, summary, &samples, Some(20.0))
    }

    fn run(reports: Vec<AggregateReport>, skipped: Vec<SkippedCandidate>) -> BenchmarkRun {
        let baseline = reports.first().map(|r| r.name.clone()).unwrap_or_default();
        BenchmarkRun {
            comparison: compare(&reports, &baseline),
            reports,
            skipped,
        }
    }

    #[test]
    fn test_render_candidate_sections() {
        let text = render_candidate(&report("node", 4, 100, Some(64.0)));
        assert!(text.contains("100 completed, 0 failed"));
        assert!(text.contains("100.00 req/s"));
        assert!(text.contains("p50 4.00ms"));
        assert!(text.contains("Initial Mem: 20.0 MB"));
        assert!(text.contains("avg 64.0 MB"));
        assert!(!text.contains("Errors"));

        let bare = render_candidate(&report("bun", 4, 10, None));
        assert!(bare.contains("no samples collected"));
    }

    #[test]
    fn test_render_summary_table_and_sections() {
        let text = render_summary(&run(
            vec![
                report("node", 4, 100, Some(64.0)),
                report("bun", 2, 300, None),
            ],
            vec![SkippedCandidate {
                name: "deno".to_string(),
                kind: "readiness_timeout".to_string(),
                reason: "never ready".to_string(),
            }],
        ));

        assert!(text.contains("| Candidate "));
        assert!(text.contains("| node "));
        assert!(text.contains("300.00"));
        assert!(text.contains("n/a"));
        assert!(text.contains("Best throughput:"));
        assert!(text.contains("Speedup vs node"));
        assert!(text.contains("3.00x faster"));
        assert!(text.contains("[readiness_timeout]: never ready"));
    }

    #[test]
    fn test_render_summary_without_reports() {
        let text = render_summary(&run(vec![], vec![]));
        assert!(text.contains("No candidate produced results."));
        assert!(!text.contains("Winners"));
    }
}
