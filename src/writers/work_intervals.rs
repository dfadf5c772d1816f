
use serde::Serialize;

use crate::data_types::ranges::Range;

/// One work interval, with both coordinate conventions
#[derive(Serialize)]
struct WorkIntervalRow<'a> {
    /// Contig name
    contig: &'a str,
    /// 0-based inclusive start
    start: u64,
    /// 0-based exclusive end
    end: u64,
    /// 1-based inclusive literal
    literal: String
}

/// Writes the work intervals as a TSV with a header
/// # Arguments
/// * `writer` - destination, e.g. stdout or a file
/// * `intervals` - the intervals, in processing order
pub fn write_work_intervals<W: std::io::Write>(writer: W, intervals: &[Range]) -> csv::Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for interval in intervals.iter() {
        csv_writer.serialize(WorkIntervalRow {
            contig: interval.contig(),
            start: interval.start(),
            end: interval.end(),
            literal: interval.to_literal()
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_work_intervals() {
        let intervals = vec![
            Range::new("chr2", 0, 50).unwrap(),
            Range::new("chr2", 50, 100).unwrap()
        ];
        let mut buffer = vec![];
        write_work_intervals(&mut buffer, &intervals).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "contig\tstart\tend\tliteral\nchr2\t0\t50\tchr2:1-50\nchr2\t50\t100\tchr2:51-100\n");
    }
}
