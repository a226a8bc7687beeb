//! TXT record probe: single query, chunks parsed into `key=value` pairs.

use std::collections::BTreeMap;

use log::debug;

use crate::config::DnsConfig;
use crate::error::{HostscopeResult, ProbeError};
use crate::types::{DnsRecordType, RecordSet, TxtRecordsReport, TxtValue};

use super::deadline::try_with_deadline;
use super::dns::query_record_type;
use super::resolver::fan_out_resolver;

const NO_RECORDS: &str = "No TXT records found";

/// Fetch and parse the TXT records of `host`.
///
/// Missing records are a skipped report; any other failure is returned.
pub async fn txt_records(host: &str, config: &DnsConfig) -> HostscopeResult<TxtRecordsReport> {
    let budget = config.txt_timeout();
    let resolver = fan_out_resolver(config, budget);

    let outcome = try_with_deadline(
        budget,
        query_record_type(&resolver, host, DnsRecordType::Txt),
    )
    .await;

    match outcome {
        Ok(RecordSet::Txt(records)) if !records.is_empty() => {
            debug!("[TXT] {host}: {} record(s)", records.len());
            Ok(TxtRecordsReport::Parsed(parse_txt_records(&records)))
        }
        Ok(_) | Err(ProbeError::NotFound(_)) => Ok(TxtRecordsReport::Skipped {
            skipped: NO_RECORDS.to_string(),
        }),
        Err(e) => Err(e),
    }
}

/// Split every chunk at its first `=`. Later keys overwrite earlier ones.
fn parse_txt_records(records: &[Vec<String>]) -> BTreeMap<String, TxtValue> {
    let mut parsed = BTreeMap::new();
    for chunk in records.iter().flatten() {
        let (key, value) = chunk.split_once('=').unwrap_or((chunk.as_str(), ""));
        let value = if value.is_empty() {
            TxtValue::Flag(true)
        } else {
            TxtValue::Text(value.to_string())
        };
        parsed.insert(key.to_string(), value);
    }
    parsed
}
