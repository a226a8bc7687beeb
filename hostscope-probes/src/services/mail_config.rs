//! Mail configuration probe: MX + email-related TXT records, hosted provider detection.

use log::debug;

use crate::config::DnsConfig;
use crate::types::{DnsRecordType, DnsRecords, MailConfigReport, MailService, MxRecord};

use super::dns::{fan_out, query_record_type};
use super::resolver::fan_out_resolver;

/// Case-insensitive prefixes of email authentication records.
const EMAIL_TXT_PREFIXES: [&str; 3] = ["v=spf1", "v=dkim1", "v=dmarc1"];

/// Case-insensitive markers of mail-provider domain verification records.
const EMAIL_TXT_MARKERS: [&str; 4] = [
    "google-site-verification",
    "ms=",
    "protonmail-verification",
    "zoho-verification",
];

/// MX exchange substrings → provider name.
const MAIL_PROVIDERS: [(&[&str], &str); 5] = [
    (&["google.com", "googlemail.com"], "Google Workspace"),
    (&["outlook.com"], "Microsoft 365"),
    (&["protonmail.ch"], "ProtonMail"),
    (&["yahoodns.net"], "Yahoo Mail"),
    (&["zoho.com"], "Zoho Mail"),
];

/// Query MX and TXT concurrently, each isolated under the mail query budget.
pub async fn mail_config(host: &str, config: &DnsConfig) -> MailConfigReport {
    let budget = config.mail_query_timeout();
    let resolver = fan_out_resolver(config, budget);

    let results = fan_out(&[DnsRecordType::Mx, DnsRecordType::Txt], budget, |record_type| {
        query_record_type(&resolver, host, record_type)
    })
    .await;
    let records = DnsRecords::from_results(results);

    let report = build_report(records.mx, records.txt);
    debug!(
        "[MAIL] {host}: {} MX, {} email TXT, {} provider(s)",
        report.mx_records.len(),
        report.txt_records.len(),
        report.mail_services.len()
    );
    report
}

fn build_report(mx_records: Vec<MxRecord>, txt_records: Vec<Vec<String>>) -> MailConfigReport {
    let mail_services = detect_mail_services(&mx_records);
    let txt_records = txt_records
        .into_iter()
        .filter(|chunks| is_email_txt(&chunks.concat()))
        .collect();
    MailConfigReport {
        mx_records,
        txt_records,
        mail_services,
    }
}

fn is_email_txt(record: &str) -> bool {
    let lower = record.to_lowercase();
    EMAIL_TXT_PREFIXES.iter().any(|p| lower.starts_with(p))
        || EMAIL_TXT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Recognised providers, de-duplicated by `{provider, value}` in first-seen order.
fn detect_mail_services(mx_records: &[MxRecord]) -> Vec<MailService> {
    let mut services: Vec<MailService> = Vec::new();
    for record in mx_records {
        let exchange = record.exchange.to_lowercase();
        for (markers, provider) in MAIL_PROVIDERS {
            if markers.iter().any(|m| exchange.contains(m)) {
                let service = MailService {
                    provider: provider.to_string(),
                    value: record.exchange.clone(),
                };
                if !services.contains(&service) {
                    services.push(service);
                }
            }
        }
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mx(exchange: &str, priority: u16) -> MxRecord {
        MxRecord {
            exchange: exchange.to_string(),
            priority,
        }
    }

    #[test]
    fn test_is_email_txt_prefixes() {
        assert!(is_email_txt("v=spf1 include:_spf.google.com ~all"));
        assert!(is_email_txt("V=DMARC1; p=reject"));
        assert!(is_email_txt("v=DKIM1; k=rsa; p=MIGf"));
        assert!(!is_email_txt("include v=spf1"));
    }

    #[test]
    fn test_is_email_txt_markers() {
        assert!(is_email_txt("google-site-verification=abc123"));
        assert!(is_email_txt("MS=ms12345678"));
        assert!(is_email_txt("protonmail-verification=xyz"));
        assert!(is_email_txt("zoho-verification=zb1234.zmverify.zoho.com"));
        assert!(!is_email_txt("facebook-domain-verification=abc"));
    }

    #[test]
    fn test_detect_google_and_microsoft() {
        let services = detect_mail_services(&[
            mx("aspmx.l.google.com", 1),
            mx("contoso-com.mail.protection.outlook.com", 5),
        ]);
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].provider, "Google Workspace");
        assert_eq!(services[0].value, "aspmx.l.google.com");
        assert_eq!(services[1].provider, "Microsoft 365");
    }

    #[test]
    fn test_detect_is_case_insensitive_and_keeps_original_value() {
        let services = detect_mail_services(&[mx("MX01.MAIL.ZOHO.COM", 10)]);
        assert_eq!(
            services,
            vec![MailService {
                provider: "Zoho Mail".into(),
                value: "MX01.MAIL.ZOHO.COM".into(),
            }]
        );
    }

    #[test]
    fn test_detect_dedups_identical_pairs() {
        let services = detect_mail_services(&[
            mx("mail.protonmail.ch", 10),
            mx("mail.protonmail.ch", 20),
            mx("mailsec.protonmail.ch", 20),
        ]);
        assert_eq!(services.len(), 2);
        assert!(services.iter().all(|s| s.provider == "ProtonMail"));
    }

    #[test]
    fn test_detect_unknown_provider() {
        assert!(detect_mail_services(&[mx("mx.example.com", 10)]).is_empty());
    }

    #[test]
    fn test_build_report_filters_txt() {
        let report = build_report(
            vec![mx("mta5.am0.yahoodns.net", 1)],
            vec![
                vec!["v=spf1 ".into(), "-all".into()],
                vec!["some-other-token".into()],
            ],
        );
        assert_eq!(report.txt_records.len(), 1);
        assert_eq!(report.mail_services[0].provider, "Yahoo Mail");
        assert_eq!(report.mx_records.len(), 1);
    }
}
