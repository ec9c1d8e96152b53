// Reading the item costs of a budget from CSV files.

use std::collections::BTreeMap;
use std::io::Read;

use crate::study::*;

/// Reads `id,cost` rows. A first row whose cost is not a number is taken as
/// a header and skipped.
pub fn read_costs_csv(path: &str) -> StudyResult<BTreeMap<String, f64>> {
    info!("Attempting to read cost file {:?}", path);
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    read_costs(rdr)
}

pub fn read_costs<R: Read>(rdr: csv::Reader<R>) -> StudyResult<BTreeMap<String, f64>> {
    let mut res: BTreeMap<String, f64> = BTreeMap::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(CsvLineParseSnafu {})?;
        let id = line.get(0).context(CsvLineTooShortSnafu { lineno })?;
        let raw = line.get(1).context(CsvLineTooShortSnafu { lineno })?;
        let cost = match raw.parse::<f64>() {
            Ok(x) => x,
            Err(_) if lineno == 1 => {
                debug!("read_costs: skipping header {:?}", line);
                continue;
            }
            Err(_) => {
                return CsvNumberSnafu {
                    lineno,
                    value: raw.to_string(),
                }
                .fail()
            }
        };
        if res.insert(id.to_string(), cost).is_some() {
            whatever!("Cost of {} given twice (line {})", id, lineno)
        }
    }
    debug!("read_costs: {:?}", res);
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(s: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(s.as_bytes())
    }

    #[test]
    fn with_header() {
        let costs = read_costs(reader("id,cost\nbike, 100\nbus,300.5\n")).unwrap();
        assert_eq!(costs.len(), 2);
        assert_eq!(costs["bike"], 100.0);
        assert_eq!(costs["bus"], 300.5);
    }

    #[test]
    fn without_header() {
        let costs = read_costs(reader("car,450\n")).unwrap();
        assert_eq!(costs["car"], 450.0);
    }

    #[test]
    fn bad_rows() {
        assert!(matches!(
            read_costs(reader("id,cost\ncar,lots\n")),
            Err(StudyError::CsvNumber { lineno: 2, .. })
        ));
        assert!(read_costs(reader("car,1\ncar,2\n")).is_err());
    }
}
