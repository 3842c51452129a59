//! Trello board storage: one list per container, one card per issue.
//!
//! Writes hit the API immediately, so `commit` has nothing to flush. Cards
//! carry the issue url as their first attachment; the origin has nowhere to
//! live, so comparison is by title only.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;

use taskhub_core::{ContainerName, Issue, IssueList, TrelloSettings};
use taskhub_sync::{ContainerId, StorageAdapter, StorageError};

use crate::http;

#[derive(Debug, Deserialize)]
struct TrelloList {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Card {
    id: String,
    name: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(default)]
    url: String,
}

impl Card {
    fn into_issue(self) -> Issue {
        let url = self
            .attachments
            .into_iter()
            .next()
            .map(|a| a.url)
            .unwrap_or_default();
        Issue::new(self.name, url, "")
    }
}

pub struct TrelloStorage {
    agent: ureq::Agent,
    api_url: String,
    appkey: String,
    token: String,
    board_id: String,
    /// List name → list id, filled as containers are resolved.
    lists: Mutex<HashMap<String, String>>,
}

impl TrelloStorage {
    pub fn new(settings: &TrelloSettings) -> Self {
        Self {
            agent: http::agent(),
            api_url: http::base_url(&settings.api_url),
            appkey: settings.appkey.clone(),
            token: settings.token.clone(),
            board_id: settings.boardid.clone(),
            lists: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}/1{}", self.api_url, path))
            .query("key", &self.appkey)
            .query("token", &self.token)
    }

    fn list_id(&self, name: &ContainerName) -> Result<String, StorageError> {
        let mut lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = lists.get(name.as_str()) {
            return Ok(id.clone());
        }

        let open: Vec<TrelloList> = self
            .request("GET", &format!("/boards/{}/lists", self.board_id))
            .query("filter", "open")
            .call()
            .map_err(http::storage_error)?
            .into_json()
            .map_err(http::storage_decode)?;
        if let Some(list) = open.into_iter().find(|l| l.name == name.as_str()) {
            lists.insert(list.name, list.id.clone());
            return Ok(list.id);
        }

        tracing::info!(container = %name, "creating trello list");
        let created: TrelloList = self
            .request("POST", "/lists")
            .query("name", name.as_str())
            .query("idBoard", &self.board_id)
            .query("pos", "bottom")
            .call()
            .map_err(http::storage_error)?
            .into_json()
            .map_err(http::storage_decode)?;
        lists.insert(created.name, created.id.clone());
        Ok(created.id)
    }

    fn open_cards(&self, list_id: &str) -> Result<Vec<Card>, StorageError> {
        self.request("GET", &format!("/lists/{list_id}/cards"))
            .query("filter", "open")
            .query("attachments", "true")
            .call()
            .map_err(http::storage_error)?
            .into_json()
            .map_err(http::storage_decode)
    }

    fn attach_url(&self, card: &Card, url: &str) -> Result<(), StorageError> {
        if url.is_empty() || card.attachments.iter().any(|a| a.url == url) {
            return Ok(());
        }
        self.request("POST", &format!("/cards/{}/attachments", card.id))
            .query("url", url)
            .call()
            .map_err(http::storage_error)?;
        tracing::debug!(card = %card.id, url, "attached url");
        Ok(())
    }
}

impl StorageAdapter for TrelloStorage {
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        self.list_id(name).map(ContainerId)
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        Ok(self
            .open_cards(&container.0)?
            .into_iter()
            .map(Card::into_issue)
            .collect())
    }

    /// Reuses an open card with the same title, so a retried create never
    /// produces a duplicate.
    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let list_id = self.list_id(container)?;
        let existing = self
            .open_cards(&list_id)?
            .into_iter()
            .find(|card| card.name == issue.title);
        let card = match existing {
            Some(card) => card,
            None => self
                .request("POST", "/cards")
                .query("idList", &list_id)
                .query("name", &issue.title)
                .query("pos", "bottom")
                .call()
                .map_err(http::storage_error)?
                .into_json()
                .map_err(http::storage_decode)?,
        };
        self.attach_url(&card, &issue.url)
    }

    /// Archives the first open card with a matching title.
    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let list_id = self.list_id(container)?;
        let Some(card) = self
            .open_cards(&list_id)?
            .into_iter()
            .find(|card| card.name == issue.title)
        else {
            return Ok(());
        };
        self.request("PUT", &format!("/cards/{}", card.id))
            .query("closed", "true")
            .call()
            .map_err(http::storage_error)?;
        Ok(())
    }

    fn compare_by_title_only(&self) -> bool {
        true
    }

    fn commit(&self, _description: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
