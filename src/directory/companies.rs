//! Business-registry representation-rights lookup.
//!
//! The business registry exposes a SOAP endpoint; the request carries the
//! service credentials in the body (not transport auth) together with the
//! person's local identifier, and the response lists the companies the
//! person may represent. Zero matches is a normal answer, not an error.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::UpstreamError;
use crate::config::BusinessRegistryConfig;

use super::store::Company;

/// SOAP client for company affiliation lookups.
pub struct CompanyLookup {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl CompanyLookup {
    /// Build a client against the configured SOAP endpoint.
    pub fn new(config: &BusinessRegistryConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Query the companies a person may represent, by local identifier.
    pub async fn representation_rights(
        &self,
        personal_code: &str,
    ) -> Result<Vec<Company>, UpstreamError> {
        let envelope = build_request(&self.username, &self.password, personal_code);

        let response = self
            .http
            .post(&self.url)
            .header("content-type", "text/xml; charset=utf-8")
            .body(envelope)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Other(e.to_string()))?;

        let companies = parse_response(&body)?;
        debug!(count = companies.len(), "Representation-rights lookup done");
        Ok(companies)
    }
}

fn build_request(username: &str, password: &str, personal_code: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:prod="http://arireg.x-road.eu/producer/">
  <soapenv:Body>
    <prod:esindus_v2>
      <prod:keha>
        <prod:ariregister_kasutajanimi>{}</prod:ariregister_kasutajanimi>
        <prod:ariregister_parool>{}</prod:ariregister_parool>
        <prod:fyysilise_isiku_kood>{}</prod:fyysilise_isiku_kood>
      </prod:keha>
    </prod:esindus_v2>
  </soapenv:Body>
</soapenv:Envelope>"#,
        escape_xml(username),
        escape_xml(password),
        escape_xml(personal_code),
    )
}

fn escape_xml(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// Pull `<item>` entries with `ariregistri_kood` / `arinimi` children out
/// of the response envelope. Namespace prefixes vary between environments,
/// so matching is on the local element name.
fn parse_response(xml: &str) -> Result<Vec<Company>, UpstreamError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut companies = Vec::new();
    let mut in_item = false;
    let mut current_tag = String::new();
    let mut registry_code = String::new();
    let mut name = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let qname = e.name();
                let local = local_name(qname.as_ref());
                if local == "item" {
                    in_item = true;
                    registry_code.clear();
                    name.clear();
                } else if in_item {
                    current_tag = local.to_string();
                }
            }
            Ok(Event::Text(t)) if in_item => {
                let raw = String::from_utf8_lossy(&t).into_owned();
                let text = quick_xml::escape::unescape(&raw)
                    .map_or(raw.clone(), std::borrow::Cow::into_owned);
                match current_tag.as_str() {
                    "ariregistri_kood" => registry_code = text,
                    "arinimi" => name = text,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = local_name(e.name().as_ref()).to_string();
                if local == "item" {
                    in_item = false;
                    if !registry_code.is_empty() {
                        companies.push(Company {
                            registry_code: std::mem::take(&mut registry_code),
                            name: std::mem::take(&mut name),
                        });
                    }
                } else if in_item {
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(UpstreamError::Other(format!("Bad SOAP response: {e}"))),
            Ok(_) => {}
        }
    }

    Ok(companies)
}

fn local_name(qname: &[u8]) -> &str {
    let name = qname
        .iter()
        .position(|&b| b == b':')
        .map_or(qname, |i| &qname[i + 1..]);
    std::str::from_utf8(name).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <prod:esindus_v2Response xmlns:prod="http://arireg.x-road.eu/producer/">
      <prod:keha>
        <prod:ettevotjad>
          <prod:item>
            <prod:ariregistri_kood>12345678</prod:ariregistri_kood>
            <prod:arinimi>Näidis OÜ</prod:arinimi>
          </prod:item>
          <prod:item>
            <prod:ariregistri_kood>87654321</prod:ariregistri_kood>
            <prod:arinimi>Teine AS</prod:arinimi>
          </prod:item>
        </prod:ettevotjad>
      </prod:keha>
    </prod:esindus_v2Response>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn parses_company_items() {
        let companies = parse_response(RESPONSE).unwrap();
        assert_eq!(
            companies,
            vec![
                Company {
                    registry_code: "12345678".to_string(),
                    name: "Näidis OÜ".to_string(),
                },
                Company {
                    registry_code: "87654321".to_string(),
                    name: "Teine AS".to_string(),
                },
            ]
        );
    }

    #[test]
    fn zero_matches_is_empty_not_error() {
        let xml = r#"<Envelope><Body><keha><ettevotjad/></keha></Body></Envelope>"#;
        assert_eq!(parse_response(xml).unwrap(), vec![]);
    }

    #[test]
    fn request_escapes_credentials() {
        let req = build_request("user", "p<ss&word", "38903110313");
        assert!(req.contains("p&lt;ss&amp;word"));
        assert!(req.contains("<prod:fyysilise_isiku_kood>38903110313</prod:fyysilise_isiku_kood>"));
    }
}
