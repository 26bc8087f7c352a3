use crate::config::TagFilters;
use crate::credentials::Credential;
use crate::inventory::InstanceRecord;
use crate::prelude::*;
use aws_sigv4::http_request::{sign, SignableRequest, SigningParams, SigningSettings};
use http::request::Parts;
use http::Request;
use itertools::Itertools;
use minreq::Response;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use roxmltree::{Document, Node};
use std::time::SystemTime;

pub const EC2_API_VERSION: &str = "2016-11-15";
pub const NOT_AVAILABLE: &str = "N/A";

/// RFC 3986 unreserved characters stay as they are, everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), values: vec![value.into()] }
    }
}

/// Running instances whose name and group tags match the configured patterns.
pub fn instance_filters(tags: &TagFilters) -> Vec<Filter> {
    vec![
        Filter::new("instance-state-name", "running"),
        Filter::new(f!("tag:{}", tags.name_tag), &tags.name_filter),
        Filter::new(f!("tag:{}", tags.group_tag), &tags.group_filter),
    ]
}

pub fn describe_instances_query(filters: &[Filter]) -> String {
    let encode = |s: &str| utf8_percent_encode(s, QUERY_VALUE).to_string();
    let mut params = vec![
        ("Action".to_string(), "DescribeInstances".to_string()),
        ("Version".to_string(), EC2_API_VERSION.to_string()),
    ];
    for (i, filter) in filters.iter().enumerate() {
        let n = i + 1;
        params.push((f!("Filter.{n}.Name"), encode(&filter.name)));
        for (j, value) in filter.values.iter().enumerate() {
            params.push((f!("Filter.{n}.Value.{}", j + 1), encode(value)));
        }
    }
    params.into_iter().map(|(k, v)| f!("{k}={v}")).join("&")
}

/// Source of raw `DescribeInstances` XML responses.
pub trait DescribeInstances {
    fn describe_instances(&self, filters: &[Filter]) -> Result<String>;
}

pub struct Ec2Client {
    credential: Credential,
    endpoint: String,
}

impl Ec2Client {
    pub fn new(credential: Credential, endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .not_empty()
            .unwrap_or_else(|| f!("https://ec2.{}.amazonaws.com/", credential.region));
        Self { credential, endpoint }
    }
}

impl DescribeInstances for Ec2Client {
    fn describe_instances(&self, filters: &[Filter]) -> Result<String> {
        let separator = if self.endpoint.contains('?') { "&" } else { "?" };
        let url = f!("{}{separator}{}", self.endpoint, describe_instances_query(filters));
        let cred = &self.credential;
        let res = aws_send(&url, "ec2", cred)?;
        check_response(&cred.profile, res.status_code, &res.reason_phrase, res.as_str()?)
    }
}

/// Passes a 2xx body through, turns anything else into an error carrying the
/// provider's error code and message when the body has them.
fn check_response(profile: &str, status: i32, reason: &str, body: &str) -> Result<String> {
    if !(200..=299).contains(&status) {
        let detail = api_error(body).unwrap_or_else(|| reason.to_string());
        bail!("Error getting instances for {profile}, {status}, {detail}")
    }
    Ok(body.to_string())
}

fn aws_sign(
    req: &mut Request<impl AsRef<[u8]>>,
    service_name: &str,
    Credential { access_key, secret, token, region, .. }: &Credential,
) -> Result<()> {
    let signing_settings = SigningSettings::default();
    let mut signing_params = SigningParams::builder()
        .access_key(access_key)
        .secret_key(secret)
        .region(region)
        .service_name(service_name)
        .time(SystemTime::now())
        .settings(signing_settings);
    if !token.is_empty() {
        signing_params = signing_params.security_token(token)
    }
    let signing_params = signing_params.build()?;
    let signable_request = SignableRequest::from(&*req);
    let (signing_instructions, _signature) = sign(signable_request, &signing_params)
        .map_err(|err| eyre!("can't sign request: {err}"))?
        .into_parts();
    signing_instructions.apply_to_request(req);
    Ok(())
}

fn aws_send(url: &str, service_name: &str, cred: &Credential) -> Result<Response> {
    let mut req = Request::builder().uri(url).body("")?;
    aws_sign(&mut req, service_name, cred)?;
    let (parts, _) = req.into_parts();
    let Parts { uri, headers, .. } = parts;
    let mut req = minreq::Request::new(minreq::Method::Get, uri.to_string());
    for (k, v) in headers.iter() {
        req = req.with_header(k.as_str(), v.to_str()?);
    }
    let res = req.send()?;
    Ok(res)
}

trait NodeExt<'a, 'input: 'a> {
    fn find_tag(&self, name: &str) -> Option<Node<'a, 'input>>;
    fn tag_text(&self, name: &str) -> Option<&'a str>;
    fn items(&self) -> Vec<Node<'a, 'input>>;
}

impl<'a, 'input: 'a> NodeExt<'a, 'input> for Node<'a, 'input> {
    fn find_tag(&self, name: &str) -> Option<Node<'a, 'input>> {
        self.children().find(|t| t.has_tag_name(name))
    }

    fn tag_text(&self, name: &str) -> Option<&'a str> {
        self.find_tag(name)?.text()
    }

    fn items(&self) -> Vec<Node<'a, 'input>> {
        self.children().filter(|t| t.has_tag_name("item")).collect_vec()
    }
}

/// `Code: Message` of an EC2 error response, if the body is one.
pub fn api_error(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    let error = doc.descendants().find(|n| n.has_tag_name("Error"))?;
    let code = error.tag_text("Code").unwrap_or_default();
    let message = error.tag_text("Message").unwrap_or_default();
    Some(f!("{code}: {message}"))
}

/// Flattens a `DescribeInstances` response into one record per instance.
///
/// When a tag key appears more than once the last occurrence wins.
pub fn parse_instances(xml: &str, tags: &TagFilters) -> Result<Vec<InstanceRecord>> {
    let doc = Document::parse(xml).wrap_err("DescribeInstances returned invalid xml")?;
    let reservations = doc
        .root_element()
        .find_tag("reservationSet")
        .ok_or_else(|| eyre!("DescribeInstances response has no reservationSet"))?;
    let records = reservations
        .items()
        .into_iter()
        .flat_map(|reservation| {
            reservation.find_tag("instancesSet").map(|set| set.items()).unwrap_or_default()
        })
        .map(|instance| {
            let public_address = instance
                .tag_text("ipAddress")
                .map(|ip| ip.trim())
                .filter(|ip| !ip.is_empty())
                .unwrap_or(NOT_AVAILABLE)
                .to_string();
            let mut name = String::new();
            let mut group = String::new();
            for tag in instance.find_tag("tagSet").map(|set| set.items()).unwrap_or_default() {
                let key = tag.tag_text("key").unwrap_or_default();
                let value = tag.tag_text("value").unwrap_or_default();
                if key == tags.name_tag {
                    name = value.to_string();
                }
                if key == tags.group_tag {
                    group = value.to_string();
                }
            }
            InstanceRecord { name, public_address, group }
        })
        .collect_vec();
    Ok(records)
}

/// Queries the provider for matching running instances and flattens the result.
pub fn collect(source: &impl DescribeInstances, tags: &TagFilters) -> Result<Vec<InstanceRecord>> {
    let filters = instance_filters(tags);
    let xml = source.describe_instances(&filters)?;
    parse_instances(&xml, tags)
}
