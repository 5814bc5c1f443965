//! # End-to-end Parsing Tests
//!
//! Runs whole simulator logs through [`LogParser`] and the aggregator, from
//! files on disk in both the box-table and the CSV encoding.

use std::io::Write;
use std::path::Path;

use blobvote_analyzer::{
    aggregate, AnalyzerConfig, AnalyzerError, LayoutKind, LogParser, RejectionKind,
    SourceFormat, StatusSource,
};
use tempfile::NamedTempFile;

/// Per-block table as printed by the simulator, with progress lines between
/// blocks and a blob summary table at the end.
const SIMULATOR_LOG: &str = "\
Block Number: 1
+-------+------------------+---------+--------------------------+--------------+-----------------+
| Block | Proposer(Status) | Blob ID | Votes(Status)            | Honest Votes | Malicious Votes |
+-------+------------------+---------+--------------------------+--------------+-----------------+
| 1     | 152(honest)      | 0       | 7(honest), 2(malicious)  | 7            | 2               |
| 1     | 152(honest)      | 1       | 9(honest)                | 9            | 0               |
+-------+------------------+---------+--------------------------+--------------+-----------------+
Block Number: 2
+-------+------------------+---------+--------------------------+--------------+-----------------+
| Block | Proposer(Status) | Blob ID | Votes(Status)            | Honest Votes | Malicious Votes |
+-------+------------------+---------+--------------------------+--------------+-----------------+
| 2     | 8314(malicious)  | 2       | 3(honest), 5(malicious)  | 3            | 5               |
| 2     | 8314(malicious)  | 3       | 4(honest), 4(malicious)  | 4            | 4               |
+-------+------------------+---------+--------------------------+--------------+-----------------+
+------+-----------------------+-------------+--------------+-----------------+
| Blob | Block Proposer Status | Total Votes | Honest Votes | Malicious Votes |
+------+-----------------------+-------------+--------------+-----------------+
| 0    | Honest                | 9           | 7            | 2               |
+------+-----------------------+-------------+--------------+-----------------+
";

fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_simulator_table_end_to_end() {
    let file = write_temp(SIMULATOR_LOG, ".txt");
    let parsed = LogParser::default().parse_path(file.path()).unwrap();

    assert_eq!(parsed.report.accepted, 4);
    assert_eq!(parsed.report.layout, Some(LayoutKind::Counted));
    // The summary row lands under a header with no block or proposer column.
    assert_eq!(parsed.report.rejected, 1);
    assert_eq!(parsed.report.samples[0].kind, RejectionKind::Extraction);
    assert_eq!(parsed.report.total_lines, SIMULATOR_LOG.lines().count());

    for record in &parsed.records {
        assert_eq!(record.proposer_status_source(), StatusSource::Tag);
        assert_eq!(record.total_votes(), record.honest_votes() + record.malicious_votes());
    }
    assert!(parsed.records[2].proposer_is_malicious());

    let aggregates = aggregate(&parsed.records);
    let block_1 = aggregates.per_block.group(1).unwrap();
    assert_eq!(block_1.honest_votes, 16);
    assert_eq!(block_1.malicious_votes, 2);
    assert_eq!(block_1.malicious_proposals, 0);

    let block_2 = aggregates.per_block.group(2).unwrap();
    assert_eq!(block_2.total_votes, 16);
    assert_eq!(block_2.malicious_proposals, 2);

    assert_eq!(aggregates.per_blob.len(), 4);
    assert!(aggregates.voter_correlation.is_none());
}

#[test]
fn test_ballot_length_mismatch_is_excluded() {
    let log = "\
┌───────┬──────────┬─────────┬───────────────┐
│ Block │ Proposer │ Blob ID │ Ballots       │
├───────┼──────────┼─────────┼───────────────┤
│ 1     │ 150      │ 0       │ 1, 0, 1, 1, 0 │
│ 1     │ 150      │ 1       │ 1, 1, 1, 1, 1 │
│ 2     │ 151      │ 2       │ 1, 1, 1, 1, 1, 1 │
│ 3     │ 8001     │ 3       │ 0, 0, 0, 1, 0 │
└───────┴──────────┴─────────┴───────────────┘
";
    let parsed = LogParser::default().parse_box_table(log);
    assert_eq!(parsed.report.accepted, 3);
    assert_eq!(parsed.report.rejected, 1);
    assert_eq!(parsed.report.validation_errors, 1);
    assert_eq!(parsed.report.samples[0].line_number, 6);
    assert_eq!(parsed.report.voter_set_size, Some(5));

    let aggregates = aggregate(&parsed.records);
    assert!(aggregates.per_block.group(2).is_none());
    assert_eq!(aggregates.per_block.len(), 2);

    let block_3 = aggregates.per_block.group(3).unwrap();
    assert_eq!(block_3.honest_votes, 1);
    assert_eq!(block_3.malicious_votes, 4);
    assert_eq!(block_3.malicious_proposals, 1);

    let matrix = aggregates.voter_correlation.unwrap();
    assert_eq!(matrix.voters, 5);
}

#[test]
fn test_threshold_classifies_untagged_proposers() {
    let log = "\
│ 1 │ 7999 │ 0 │ 2 │ 0 │
│ 2 │ 8000 │ 1 │ 2 │ 0 │
";
    let parsed = LogParser::default().parse_box_table(log);
    assert!(!parsed.records[0].proposer_is_malicious());
    assert!(parsed.records[1].proposer_is_malicious());
    assert_eq!(parsed.records[1].proposer_status_source(), StatusSource::Threshold);

    let lenient = LogParser::new(AnalyzerConfig::new().with_honesty_threshold(9000));
    let parsed = lenient.parse_box_table(log);
    assert!(parsed.records.iter().all(|r| !r.proposer_is_malicious()));
}

#[test]
fn test_csv_file_end_to_end() {
    let csv = "\
block_number,proposer,blob_id,votes_bitstring,honest_votes,malicious_votes
1,150,0,\"1, 0, 1, 1\",3,1
1,150,1,\"1, 1, 0, 1\",3,1
2,8200,2,\"0, 0, 0, 1\",1,3
2,8200,3,\"0, 1, 0, 1\",2,2
";
    let file = write_temp(csv, ".csv");
    let parsed = LogParser::default().parse_path(file.path()).unwrap();
    assert_eq!(parsed.report.accepted, 4);
    assert!(parsed.report.is_clean());
    assert_eq!(parsed.report.layout, Some(LayoutKind::Bitstring));

    let aggregates = aggregate(&parsed.records);
    let block_1 = aggregates.per_block.group(1).unwrap();
    assert_eq!(block_1.honest_votes, 6);
    assert_eq!(block_1.malicious_votes, 2);
    assert!(aggregates.voter_correlation.is_some());
}

#[test]
fn test_forced_format_overrides_extension() {
    let file = write_temp("│ 1 │ 2 │ 3 │ 4 │ 5 │\n", ".csv");
    let parser = LogParser::new(AnalyzerConfig::new().with_format(SourceFormat::BoxTable));
    let parsed = parser.parse_path(file.path()).unwrap();
    assert_eq!(parsed.report.accepted, 1);
    assert_eq!(parsed.records[0].total_votes(), 9);
}

#[test]
fn test_rejection_samples_are_capped() {
    let mut log = String::new();
    for block in 0..30 {
        log.push_str(&format!("│ {} │ 1 │ 0 │ bad │ 0 │\n", block));
    }
    let parser = LogParser::new(AnalyzerConfig::new().with_max_rejection_samples(5));
    let parsed = parser.parse_box_table(&log);
    assert_eq!(parsed.report.rejected, 30);
    assert_eq!(parsed.report.samples.len(), 5);
    assert_eq!(parsed.report.samples[4].line_number, 5);
    assert!(parsed.records.is_empty());
}

#[test]
fn test_invalid_utf8_row_does_not_fail_the_file() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(b"block_number,proposer,blob_id,honest_votes,malicious_votes\n").unwrap();
    file.write_all(b"1,150,0,3,1\n").unwrap();
    file.write_all(b"2,150,1,\xff,1\n").unwrap();
    file.write_all(b"3,150,2,2,2\n").unwrap();
    file.flush().unwrap();

    let parsed = LogParser::default().parse_path(file.path()).unwrap();
    assert_eq!(parsed.report.accepted, 2);
    assert_eq!(parsed.report.rejected, 1);
    assert_eq!(parsed.report.samples[0].kind, RejectionKind::Extraction);
    assert_eq!(parsed.records[1].blob_id(), 2);

    let mut table = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    table.write_all(b"| 1 | 150 | 0 | 3 | 1 |\n| 2 | 150 | 1 | \xff | 1 |\n").unwrap();
    table.flush().unwrap();

    let parsed = LogParser::default().parse_path(table.path()).unwrap();
    assert_eq!(parsed.report.accepted, 1);
    assert_eq!(parsed.report.rejected, 1);
    assert_eq!(parsed.report.samples[0].line_number, 2);
}

#[test]
fn test_blob_summary_csv_end_to_end() {
    let csv = "\
blob_id,total_votes,honest_votes,malicious_votes,confirmed
0,12,9,3,true
1,12,5,7,false
2,11,8,3,true
";
    let file = write_temp(csv, ".csv");
    let parsed = LogParser::default().parse_path(file.path()).unwrap();
    assert_eq!(parsed.report.accepted, 3);
    assert!(parsed.report.is_clean());
    assert_eq!(parsed.records[0].proposer_status_source(), StatusSource::Unknown);

    let aggregates = aggregate(&parsed.records);
    assert!(aggregates.per_block.is_empty());
    assert_eq!(aggregates.per_blob.len(), 3);
    assert_eq!(aggregates.per_blob.confirmed_groups(), 2);
    assert_eq!(aggregates.per_blob.group(1).unwrap().total_votes, 12);
    let mean = aggregates.per_blob.statistics.total.mean.unwrap();
    assert!((mean - 35.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_huge_counts_do_not_overflow_aggregation() {
    let log = "\
│ 1 │ 1 │ 0 │ 9223372036854775807 │ 9223372036854775807 │
│ 1 │ 1 │ 1 │ 9223372036854775807 │ 9223372036854775807 │
";
    let parsed = LogParser::default().parse_box_table(log);
    assert_eq!(parsed.report.accepted, 2);

    let aggregates = aggregate(&parsed.records);
    assert_eq!(aggregates.per_block.group(1).unwrap().total_votes, u64::MAX);
}

#[test]
fn test_unreadable_source_is_fatal() {
    let result = LogParser::default().parse_path(Path::new("/nonexistent/run.txt"));
    assert!(matches!(result, Err(AnalyzerError::Io { .. })));
}
