//! Fetching small resources over HTTP(S) through curl.
use super::Invocation;

use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub fn fetch(url: &str) -> Invocation {
    Invocation::new("curl")
        .args(["--fail", "--silent", "--show-error", "--location"])
        .arg(url)
        .timeout(FETCH_TIMEOUT)
}
