//! Screen command.

use listingscrape::config::Settings;
use listingscrape::screen_url;

use super::print_json;

pub fn cmd_screen(settings: &Settings, url: &str) -> anyhow::Result<()> {
    let portals = settings.portal_registry()?;
    print_json(&screen_url(url, &portals))
}
