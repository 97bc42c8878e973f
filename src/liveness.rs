//! Link liveness classification from the landing page title and URL.

use std::fmt;

use tracing::debug;

use crate::browser::PageDriver;

/// Lower-case title or URL fragments that mark a link as dead. `login` catches
/// pages that bounced to the sign-in screen because the document is gone
/// or the session lapsed.
pub const DEAD_MARKERS: [&str; 4] = ["entry not found", "application error", "404", "login"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadReason {
    /// The landing page title contained this marker.
    Marker(&'static str),
    /// The landing URL contained this marker.
    UrlMarker(&'static str),
    /// Navigation or reading the landed page failed.
    NavigationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Live,
    Dead(DeadReason),
}

impl LinkStatus {
    pub fn is_dead(&self) -> bool {
        matches!(self, LinkStatus::Dead(_))
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Live => write!(f, "live"),
            LinkStatus::Dead(DeadReason::Marker(m)) => write!(f, "dead (title contains '{}')", m),
            LinkStatus::Dead(DeadReason::UrlMarker(m)) => write!(f, "dead (URL contains '{}')", m),
            LinkStatus::Dead(DeadReason::NavigationFailed(e)) => write!(f, "dead ({})", e),
        }
    }
}

fn find_marker(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    DEAD_MARKERS.iter().copied().find(|m| text.contains(m))
}

/// Classify a page title alone.
pub fn classify_title(title: &str) -> LinkStatus {
    match find_marker(title) {
        Some(marker) => LinkStatus::Dead(DeadReason::Marker(marker)),
        None => LinkStatus::Live,
    }
}

/// Classify the title first, then the landed URL.
pub fn classify_landing(title: &str, url: &str) -> LinkStatus {
    match classify_title(title) {
        LinkStatus::Live => match find_marker(url) {
            Some(marker) => LinkStatus::Dead(DeadReason::UrlMarker(marker)),
            None => LinkStatus::Live,
        },
        dead => dead,
    }
}

/// Navigate `page` to `url` once and classify where it lands.
pub fn classify<P: PageDriver>(page: &mut P, url: &str) -> LinkStatus {
    if let Err(e) = page.navigate(url) {
        debug!("{}: {:#}", url, e);
        return LinkStatus::Dead(DeadReason::NavigationFailed(e.to_string()));
    }
    match page.title().and_then(|title| page.url().map(|landed| (title, landed))) {
        Ok((title, landed)) => {
            let status = classify_landing(&title, &landed);
            debug!("{} -> '{}' at {} ({})", url, title, landed, status);
            status
        }
        Err(e) => {
            debug!("{}: {:#}", url, e);
            LinkStatus::Dead(DeadReason::NavigationFailed(e.to_string()))
        }
    }
}

pub fn is_dead<P: PageDriver>(page: &mut P, url: &str) -> bool {
    classify(page, url).is_dead()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    struct FixedPage {
        title: Result<String, String>,
        fail_navigation: bool,
        redirect: Option<Result<String, String>>,
        visits: Vec<String>,
    }

    impl FixedPage {
        fn titled(title: &str) -> Self {
            Self {
                title: Ok(title.to_string()),
                fail_navigation: false,
                redirect: None,
                visits: Vec::new(),
            }
        }
    }

    impl PageDriver for FixedPage {
        fn navigate(&mut self, url: &str) -> Result<()> {
            self.visits.push(url.to_string());
            if self.fail_navigation {
                Err(anyhow!("net::ERR_NAME_NOT_RESOLVED"))
            } else {
                Ok(())
            }
        }

        fn title(&self) -> Result<String> {
            self.title.clone().map_err(|e| anyhow!(e))
        }

        fn url(&self) -> Result<String> {
            match &self.redirect {
                Some(landed) => landed.clone().map_err(|e| anyhow!(e)),
                None => Ok(self.visits.last().cloned().unwrap_or_default()),
            }
        }
    }

    #[test]
    fn test_dead_markers_case_insensitive() {
        for title in [
            "Entry Not Found - Laserfiche",
            "APPLICATION ERROR",
            "404 | Page missing",
            "Login - Document Portal",
        ] {
            assert!(classify_title(title).is_dead(), "{title} should be dead");
        }
    }

    #[test]
    fn test_live_titles() {
        for title in ["Work Instruction 12 Rev C", "", "Laserfiche WebLink"] {
            assert_eq!(classify_title(title), LinkStatus::Live, "{title}");
        }
    }

    #[test]
    fn test_marker_is_reported() {
        assert_eq!(
            classify_title("Entry Not Found"),
            LinkStatus::Dead(DeadReason::Marker("entry not found"))
        );
    }

    #[test]
    fn test_navigation_failure_is_dead() {
        let mut page = FixedPage::titled("Fine");
        page.fail_navigation = true;
        assert!(matches!(
            classify(&mut page, "https://nowhere.invalid"),
            LinkStatus::Dead(DeadReason::NavigationFailed(_))
        ));
    }

    #[test]
    fn test_title_read_failure_is_dead() {
        let mut page = FixedPage::titled("unused");
        page.title = Err("target closed".to_string());
        assert!(is_dead(&mut page, "https://docs.example.com/1"));
    }

    #[test]
    fn test_one_navigation_per_check() {
        let mut page = FixedPage::titled("Entry Not Found");
        assert!(is_dead(&mut page, "https://docs.example.com/1"));
        assert!(is_dead(&mut page, "https://docs.example.com/2"));
        assert_eq!(page.visits.len(), 2);
    }

    #[test]
    fn test_live_page() {
        let mut page = FixedPage::titled("Work Instruction 12 Rev C");
        assert_eq!(classify(&mut page, "https://docs.example.com/wi12"), LinkStatus::Live);
    }

    #[test]
    fn test_redirect_to_login_url_is_dead() {
        let mut page = FixedPage::titled("Laserfiche WebLink");
        page.redirect = Some(Ok(
            "https://portal/Login.aspx?ReturnUrl=https://portal/docs/9".to_string(),
        ));
        assert_eq!(
            classify(&mut page, "https://portal/docs/9"),
            LinkStatus::Dead(DeadReason::UrlMarker("login"))
        );
    }

    #[test]
    fn test_url_read_failure_is_dead() {
        let mut page = FixedPage::titled("Work Instruction 12 Rev C");
        page.redirect = Some(Err("target closed".to_string()));
        assert!(matches!(
            classify(&mut page, "https://docs.example.com/wi12"),
            LinkStatus::Dead(DeadReason::NavigationFailed(_))
        ));
    }

    #[test]
    fn test_title_marker_wins_over_url() {
        assert_eq!(
            classify_landing("404 - Not Found", "https://portal/Login.aspx"),
            LinkStatus::Dead(DeadReason::Marker("404"))
        );
        assert_eq!(classify_landing("Document Viewer", "https://portal/docs/104"), LinkStatus::Live);
    }
}
