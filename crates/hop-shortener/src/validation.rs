use crate::error::UrlError;
use url::{Host, Url};

/// Longest URL accepted for shortening.
pub const MAX_URL_LENGTH: usize = 2048;

/// Checks that `raw` is an absolute http(s) URL with a usable host.
///
/// The host must be one of:
/// 1. a domain of at least two labels whose last label is 2-6 letters
/// 2. a dotted IPv4 address
/// 3. a bracketed IPv6 address
pub fn validate_url(raw: &str) -> Result<Url, UrlError> {
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    let length = raw.chars().count();
    if length > MAX_URL_LENGTH {
        return Err(UrlError::TooLong {
            length,
            max: MAX_URL_LENGTH,
        });
    }

    // the url crate accepts "http:host" without slashes, so check the raw prefix
    if !has_prefix_ignore_case(raw, "http://") && !has_prefix_ignore_case(raw, "https://") {
        return Err(UrlError::Scheme);
    }

    let url = Url::parse(raw)?;
    match url.host() {
        Some(Host::Domain(domain)) if is_valid_domain(domain) => Ok(url),
        Some(Host::Domain(domain)) => Err(UrlError::Host(domain.to_string())),
        // WHATWG parsing also turns "2130706433" or "0x7f.1" into an address
        Some(Host::Ipv4(addr)) => match raw_host(raw) {
            Some(host) if is_dotted_quad(host) => Ok(url),
            host => Err(UrlError::Host(
                host.map_or_else(|| addr.to_string(), str::to_string),
            )),
        },
        Some(Host::Ipv6(_)) => Ok(url),
        None => Err(UrlError::MissingHost),
    }
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Host text as written, without userinfo or port.
fn raw_host(raw: &str) -> Option<&str> {
    let rest = &raw[raw.find("://")? + 3..];
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    host_port.split(':').next()
}

/// Four decimal octets, each 0-255 without leading zeros.
fn is_dotted_quad(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.len() <= 3
                && octet.bytes().all(|b| b.is_ascii_digit())
                && (octet.len() == 1 || !octet.starts_with('0'))
                && octet.parse::<u8>().is_ok()
        })
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let (tld, rest) = match labels.split_last() {
        Some(split) => split,
        None => return false,
    };

    (2..=6).contains(&tld.len())
        && tld.bytes().all(|b| b.is_ascii_alphabetic())
        && rest.iter().all(|label| is_valid_label(label))
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
