//! Shared fixtures: history page builders and an in-memory fake of the remote site
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ascension_tracker::crawling::WorkerPool;
use ascension_tracker::infrastructure::session::{
    Session, SessionError, is_maintenance_page, legacy_history_path, modern_history_path,
};

pub const NO_PLAYER_PAGE: &str = "<html><body>Sorry, that player could not be found.</body></html>";
pub const MAINTENANCE_PAGE: &str =
    "<html><head><title>Nightly Maintenance</title></head><body>The game is down for maintenance. Please come back later.</body></html>";

/// One table row in the layout the history pages use
pub fn history_row(index: &str, date: &str, days: i32, turns: i32, restrictions: &str) -> String {
    format!(
        "<tr><td class=small>{index}&nbsp;&nbsp;</td>\
         <td class=small>{date}&nbsp;</td>\
         <td class=small><span title='Total Experience: 1,000'>13</span></td>\
         <td class=small><img src=\"https://img/itemimages/spoon.gif\" title=\"Sauceror\"></td>\
         <td class=small>Marmot&nbsp;</td>\
         <td class=small><span>{turns}</span></td>\
         <td class=small><span>{days}</span></td>\
         <td class=small><img src=\"https://img/itemimages/familiar18.gif\" title=\"Mosquito (100.0%)\"></td>\
         <td class=small>{restrictions}</td></tr>"
    )
}

pub fn abandoned_row(index: &str, date: &str) -> String {
    format!("<tr><td>{index}</td><td>{date}</td><td colspan=7>Abandoned</td></tr>")
}

/// Restrictions cell: lifestyle icon followed by a path icon
pub fn restrictions(lifestyle: &str, path_tooltip: &str) -> String {
    format!(
        "<img src=\"https://img/itemimages/{lower}.gif\" title=\"{lifestyle}\">\
         <img src=\"https://img/itemimages/path.gif\" title=\"{path_tooltip}\">",
        lower = lifestyle.to_lowercase()
    )
}

pub fn history_page(player_id: i64, name: &str, rows: &str) -> String {
    format!(
        "<html><body><center><a href=\"showplayer.php?who={player_id}\">{name}</a></center>\
         <table><tr><td><b>#</b></td><td><b>Date</b></td><td><b>Level</b></td></tr>{rows}</table>\
         </body></html>"
    )
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, String>,
    broken: HashSet<String>,
    maintenance_fetches: AtomicU32,
    requests: Mutex<Vec<(String, String)>>,
    tripwire: Mutex<Option<(String, Arc<AtomicBool>)>>,
}

/// Pages keyed by request path, shared by every session handed out
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

impl FakeSite {
    pub fn builder() -> FakeSiteBuilder {
        FakeSiteBuilder::default()
    }

    pub fn session(&self, label: &str) -> FakeSession {
        FakeSession {
            label: label.to_string(),
            site: self.clone(),
            in_maintenance: false,
        }
    }

    pub fn pool(&self, sessions: usize) -> WorkerPool {
        let sessions: Vec<Box<dyn Session>> = (0..sessions)
            .map(|i| Box::new(self.session(&format!("bot{i}"))) as Box<dyn Session>)
            .collect();
        WorkerPool::new(sessions).unwrap()
    }

    /// Sets `flag` when `path` is requested
    pub fn trip_on(&self, path: String, flag: Arc<AtomicBool>) {
        *self.state.tripwire.lock().unwrap() = Some((path, flag));
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|(_, path)| path).collect()
    }
}

#[derive(Default)]
pub struct FakeSiteBuilder {
    state: SiteState,
}

impl FakeSiteBuilder {
    /// Registers both history pages of a player
    pub fn player(mut self, player_id: i64, name: &str, legacy_rows: &str, modern_rows: &str) -> Self {
        self.state
            .pages
            .insert(legacy_history_path(player_id), history_page(player_id, name, legacy_rows));
        self.state
            .pages
            .insert(modern_history_path(player_id), history_page(player_id, name, modern_rows));
        self
    }

    pub fn page(mut self, path: &str, html: String) -> Self {
        self.state.pages.insert(path.to_string(), html);
        self
    }

    /// Requests for `path` fail with a transport-level error
    pub fn broken(mut self, path: String) -> Self {
        self.state.broken.insert(path);
        self
    }

    /// The next `fetches` requests are answered by the maintenance page
    pub fn maintenance_for(self, fetches: u32) -> Self {
        self.state.maintenance_fetches.store(fetches, Ordering::SeqCst);
        self
    }

    pub fn build(self) -> FakeSite {
        FakeSite {
            state: Arc::new(self.state),
        }
    }
}

pub struct FakeSession {
    label: String,
    site: FakeSite,
    in_maintenance: bool,
}

#[async_trait]
impl Session for FakeSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_text(&mut self, path: &str) -> Result<String, SessionError> {
        let state = &self.site.state;
        state
            .requests
            .lock()
            .unwrap()
            .push((self.label.clone(), path.to_string()));

        if let Some((trigger, flag)) = state.tripwire.lock().unwrap().as_ref() {
            if trigger == path {
                flag.store(true, Ordering::SeqCst);
            }
        }

        let in_window = state
            .maintenance_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let body = if in_window {
            MAINTENANCE_PAGE.to_string()
        } else if state.broken.contains(path) {
            return Err(SessionError::LoggedOut {
                label: self.label.clone(),
            });
        } else {
            state
                .pages
                .get(path)
                .cloned()
                .unwrap_or_else(|| NO_PLAYER_PAGE.to_string())
        };

        let url = url::Url::parse("https://www.kingdomofloathing.com/")
            .and_then(|base| base.join(path))
            .map_err(SessionError::InvalidUrl)?;
        self.in_maintenance = is_maintenance_page(&url, &body);
        Ok(body)
    }

    fn is_maintenance_window(&self) -> bool {
        self.in_maintenance
    }
}
