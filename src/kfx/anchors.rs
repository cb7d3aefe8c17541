//! Anchor fragments for internal navigation and external links.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::kfx::fragment::{Fragment, StructBuilder};
use crate::kfx::symbols::sym;

/// Prefix of external link anchor ids.
///
/// `@` cannot appear in an XML id, so these never collide with anchors
/// named after source document elements.
pub const EXTERNAL_ANCHOR_PREFIX: &str = "@ext_";

/// Whether `id` names a section generated during layout (`sect_<digits>`).
///
/// Such ids share a namespace with section fragments and must not get an
/// anchor of their own.
fn is_generated_section_id(id: &str) -> bool {
    id.strip_prefix("sect_")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Build one `$266` anchor per referenced id that has a content position.
///
/// `positions` maps source element ids to the position id of the content
/// they ended up in. Output is ordered by anchor id.
pub fn build_anchor_fragments<'a, I>(
    positions: &HashMap<String, i64>,
    referenced: I,
) -> Vec<Fragment>
where
    I: IntoIterator<Item = &'a str>,
{
    let referenced: BTreeSet<&str> = referenced.into_iter().collect();
    let mut out = Vec::with_capacity(referenced.len());

    for id in referenced {
        if id.is_empty() || is_generated_section_id(id) {
            continue;
        }
        let Some(&eid) = positions.get(id) else {
            tracing::debug!(id, "referenced id has no content position");
            continue;
        };
        if eid == 0 {
            continue;
        }
        out.push(Fragment::new(
            sym::ANCHOR,
            id,
            StructBuilder::new()
                .symbol(sym::ANCHOR_NAME, id)
                .structure(sym::POSITION, StructBuilder::new().int(sym::ID, eid)),
        ));
    }

    out
}

#[derive(Debug, Default)]
struct Registrations {
    by_url: HashMap<String, String>,
    order: Vec<String>,
    counter: u64,
}

/// Interns external URLs as anchor ids.
///
/// Shared by reference between producers; every operation takes the lock
/// for its whole duration.
#[derive(Debug, Default)]
pub struct ExternalLinkRegistry {
    inner: Mutex<Registrations>,
}

impl ExternalLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        // Every mutation completes before its guard drops, so a poisoned
        // table is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Anchor id for `url`, allocating one on first sight.
    pub fn register(&self, url: &str) -> String {
        let mut reg = self.lock();
        if let Some(id) = reg.by_url.get(url) {
            return id.clone();
        }
        reg.counter += 1;
        let id = format!("{EXTERNAL_ANCHOR_PREFIX}{}", reg.counter);
        reg.by_url.insert(url.to_string(), id.clone());
        reg.order.push(url.to_string());
        id
    }

    pub fn lookup(&self, url: &str) -> Option<String> {
        self.lock().by_url.get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return all registrations as `(url, id)` in first-seen order.
    ///
    /// The counter keeps running, so ids handed out after a drain stay unique.
    pub fn drain(&self) -> Vec<(String, String)> {
        let mut reg = self.lock();
        let order = std::mem::take(&mut reg.order);
        let mut by_url = std::mem::take(&mut reg.by_url);
        order
            .into_iter()
            .filter_map(|url| by_url.remove(&url).map(|id| (url, id)))
            .collect()
    }

    /// One `$266` fragment per registered URL, in first-seen order.
    pub fn build_fragments(&self) -> Vec<Fragment> {
        let reg = self.lock();
        reg.order
            .iter()
            .filter_map(|url| {
                let id = reg.by_url.get(url)?;
                Some(Fragment::new(
                    sym::ANCHOR,
                    id.as_str(),
                    StructBuilder::new()
                        .symbol(sym::ANCHOR_NAME, id.as_str())
                        .string(sym::URI, url.as_str()),
                ))
            })
            .collect()
    }
}
