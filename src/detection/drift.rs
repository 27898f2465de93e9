//! Origin drift policies
//!
//! A policy compares the descriptor seen on this login with the one trusted
//! from earlier logins and says whether they are close enough.

use std::net::Ipv4Addr;
use std::str::FromStr;

pub trait DriftPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when `current` is close enough to `previous` to allow the login
    fn is_close(&self, current: &str, previous: &str) -> bool;
}

/// Place names must match exactly
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl DriftPolicy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn is_close(&self, current: &str, previous: &str) -> bool {
        current == previous
    }
}

/// IPv4 addresses must share the same /24
///
/// Anything that is not a dotted quad is never close to a different
/// descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubnetMatch;

impl DriftPolicy for SubnetMatch {
    fn name(&self) -> &'static str {
        "subnet"
    }

    fn is_close(&self, current: &str, previous: &str) -> bool {
        if current == previous {
            return true;
        }

        let (current_ip, previous_ip) = match (parse_ipv4(current), parse_ipv4(previous)) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                log::warn!(
                    "Cannot compare subnets of {:?} and {:?}, treating as drift",
                    current,
                    previous
                );
                return false;
            }
        };

        current_ip.octets()[..3] == previous_ip.octets()[..3]
    }
}

fn parse_ipv4(descriptor: &str) -> Option<Ipv4Addr> {
    Ipv4Addr::from_str(descriptor.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(ExactMatch.is_close("Paris", "Paris"));
        assert!(!ExactMatch.is_close("Berlin", "Paris"));
        assert!(!ExactMatch.is_close("paris", "Paris"));
    }

    #[test]
    fn test_same_subnet_is_close() {
        assert!(SubnetMatch.is_close("10.0.0.200", "10.0.0.5"));
        assert!(SubnetMatch.is_close("192.168.1.1", "192.168.1.254"));
    }

    #[test]
    fn test_different_subnet_is_drift() {
        assert!(!SubnetMatch.is_close("10.0.1.5", "10.0.0.5"));
        assert!(!SubnetMatch.is_close("11.0.0.5", "10.0.0.5"));
    }

    #[test]
    fn test_malformed_fails_closed() {
        assert!(!SubnetMatch.is_close("10.0.0", "10.0.0.5"));
        assert!(!SubnetMatch.is_close("10.0.0.x", "10.0.0.5"));
        assert!(!SubnetMatch.is_close("10.0.0.5", "Paris"));
        assert!(!SubnetMatch.is_close("2001:db8::1", "2001:db8::2"));
    }

    #[test]
    fn test_identical_descriptors_always_close() {
        assert!(SubnetMatch.is_close("2001:db8::1", "2001:db8::1"));
    }
}
