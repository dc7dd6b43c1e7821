//! Request path parsing and href rendering.
//!
//! The tree looks like this (with the default configuration):
//!
//! ```text
//! /dav/                              entry, links to the principal
//! /dav/principals/<user>/            principal
//! /dav/projects/                     calendar home, one calendar per project
//! /dav/projects/<id>                 one project
//! /dav/projects/<id>/<uid>.ics       one task
//! ```

use crate::config::BridgeConfig;
use crate::error::{DavError, DavResult};
use crate::model::Item;

/// What a request path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Entry,
    Principal,
    Home,
    Collection(i64),
    Item { collection_id: i64, uid: String },
}

impl Target {
    pub fn collection_id(&self) -> Option<i64> {
        match self {
            Target::Collection(id) => Some(*id),
            Target::Item { collection_id, .. } => Some(*collection_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DavPaths {
    base: String,
    collections: String,
    principals: String,
    extension: String,
}

impl DavPaths {
    pub fn new(config: &BridgeConfig) -> Self {
        let base = config.base_path.trim_end_matches('/').to_string();
        DavPaths {
            collections: format!("{}/{}", base, config.collections_segment),
            principals: format!("{}/{}", base, config.principals_segment),
            extension: config.document_extension.clone(),
            base,
        }
    }

    /// The calendar home set, listing every project.
    pub fn home(&self) -> String {
        format!("{}/", self.collections)
    }

    pub fn collection_href(&self, collection_id: i64) -> String {
        format!("{}/{}", self.collections, collection_id)
    }

    pub fn item_href(&self, item: &Item) -> String {
        format!(
            "{}/{}/{}.{}",
            self.collections, item.collection_id, item.uid, self.extension
        )
    }

    pub fn parse(&self, path: &str) -> DavResult<Target> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed == self.base {
            return Ok(Target::Entry);
        }

        if trimmed == self.principals || trimmed.starts_with(&format!("{}/", self.principals)) {
            return Ok(Target::Principal);
        }

        if trimmed == self.collections {
            return Ok(Target::Home);
        }

        let rest = trimmed
            .strip_prefix(&format!("{}/", self.collections))
            .ok_or_else(|| DavError::InvalidPath(path.to_string()))?;

        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [id] => Ok(Target::Collection(parse_id(id, path)?)),
            [id, file] => {
                let uid = self.strip_extension(file, path)?;
                Ok(Target::Item {
                    collection_id: parse_id(id, path)?,
                    uid,
                })
            }
            _ => Err(DavError::InvalidPath(path.to_string())),
        }
    }

    /// Extract the UID from `<base>/<collection-id>/<uid>.<ext>`.
    pub fn uid_from_item_path(&self, path: &str) -> DavResult<String> {
        match self.parse(path)? {
            Target::Item { uid, .. } => Ok(uid),
            _ => Err(DavError::InvalidPath(path.to_string())),
        }
    }

    fn strip_extension(&self, file: &str, path: &str) -> DavResult<String> {
        file.strip_suffix(&format!(".{}", self.extension))
            .filter(|uid| !uid.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DavError::InvalidPath(path.to_string()))
    }
}

fn parse_id(segment: &str, path: &str) -> DavResult<i64> {
    segment
        .parse()
        .map_err(|_| DavError::InvalidPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> DavPaths {
        DavPaths::new(&BridgeConfig::default())
    }

    #[test]
    fn test_parse_every_target_shape() {
        let p = paths();
        assert_eq!(p.parse("/dav/").unwrap(), Target::Entry);
        assert_eq!(p.parse("/dav").unwrap(), Target::Entry);
        assert_eq!(p.parse("/dav/principals/alice/").unwrap(), Target::Principal);
        assert_eq!(p.parse("/dav/projects/").unwrap(), Target::Home);
        assert_eq!(p.parse("/dav/projects/12").unwrap(), Target::Collection(12));
        assert_eq!(
            p.parse("/dav/projects/12/a6eb526d.ics").unwrap(),
            Target::Item {
                collection_id: 12,
                uid: "a6eb526d".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        let p = paths();
        for bad in [
            "/other/",
            "/dav/projects/abc",
            "/dav/projects/12/uid.txt",
            "/dav/projects/12/.ics",
            "/dav/projects/12/uid.ics/extra",
        ] {
            assert!(
                matches!(p.parse(bad), Err(DavError::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_uid_from_item_path_requires_item_shape() {
        let p = paths();
        assert_eq!(p.uid_from_item_path("/dav/projects/3/xyz.ics").unwrap(), "xyz");
        assert!(p.uid_from_item_path("/dav/projects/3").is_err());
    }

    #[test]
    fn test_hrefs_round_trip_through_parse() {
        let p = paths();
        let mut item = Item::new("task-uid", "Buy milk");
        item.collection_id = 7;

        let href = p.item_href(&item);
        assert_eq!(href, "/dav/projects/7/task-uid.ics");
        assert_eq!(p.uid_from_item_path(&href).unwrap(), "task-uid");
        assert_eq!(p.parse(&p.collection_href(7)).unwrap(), Target::Collection(7));
        assert_eq!(p.parse(&p.home()).unwrap(), Target::Home);
    }

    #[test]
    fn test_custom_base_path() {
        let config = BridgeConfig {
            base_path: "/caldav/".to_string(),
            collections_segment: "lists".to_string(),
            ..Default::default()
        };
        let p = DavPaths::new(&config);
        assert_eq!(p.parse("/caldav/lists/4").unwrap(), Target::Collection(4));
        assert_eq!(p.home(), "/caldav/lists/");
    }
}
