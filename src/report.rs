use std::fs::File;
use std::io;
use std::path::Path;

use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use num_format::{Locale, ToFormattedString};
use prettytable::{Cell, Row, Table};

use crate::{SimTime, TestResult};

/// One resolved trigger: which coroutine, what it waited on, and when it
/// resumed. The full sequence replays a run for debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub task: u64,
    pub trigger: String,
    pub time: SimTime,
}

#[derive(Debug, Clone)]
pub struct TestReport {
    pub name: String,
    pub result: TestResult,
    pub time_secs: f64,
    pub sim_steps: SimTime,
}

/// Aggregate outcome of a scheduler run.
#[derive(Debug)]
pub struct Report {
    pub tests: Vec<TestReport>,
    pub sim_steps: SimTime,
    pub wall_secs: f64,
    pub trace: Vec<TraceRecord>,
}

impl Report {
    /// Pass only if every registered test completed without failure.
    pub fn passed(&self) -> bool {
        self.tests.iter().all(|t| t.result.is_ok())
    }

    pub fn failures(&self) -> usize {
        self.tests.iter().filter(|t| t.result.is_err()).count()
    }

    pub fn print_summary(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("test"),
            Cell::new("result"),
            Cell::new("sim steps"),
            Cell::new("wall [s]"),
        ]));
        for t in &self.tests {
            let verdict = match &t.result {
                Ok(_) => "passed".to_string(),
                Err(e) => format!("failed: {}", e),
            };
            table.add_row(Row::new(vec![
                Cell::new(&t.name),
                Cell::new(&verdict),
                Cell::new(&t.sim_steps.to_formatted_string(&Locale::en)),
                Cell::new(&format!("{:.3}", t.time_secs)),
            ]));
        }
        table.printstd();
    }

    /// Write the run as JUnit XML, the format CI systems ingest.
    pub fn write_junit(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut cases = Vec::new();
        for t in &self.tests {
            let case = match &t.result {
                Ok(_) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
                Err(e) => TestCaseBuilder::failure(
                    &t.name,
                    Duration::seconds_f64(t.time_secs),
                    "failure",
                    &e.to_string(),
                ),
            }
            .build();
            cases.push(case);
        }

        let suite = TestSuiteBuilder::new(
            crate::SUITE_NAME
                .get()
                .map(String::as_str)
                .unwrap_or(env!("CARGO_PKG_NAME")),
        )
        .add_testcases(cases)
        .build();
        let report = ReportBuilder::new().add_testsuite(suite).build();
        let file = File::create(path)?;
        report
            .write_xml(file)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}
