use crate::wire::to_wire;
use crate::{tags_match, RecordStore, Result, StoreError};
use lab_record::{decode_record, Record};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

pub const REMOTE_URL_FRAGMENT: &str = "api/v1/private";

/// The status value that means "create a new remote record"; anything else
/// updates an existing one in place.
pub const CREATE_STATUS: &str = "unknown";

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Record store on a remote server, reached over a versioned, token-scoped
/// URL space: the configured base URL embeds `/api/v1/private/<token>/` and
/// operations append `{project|record}/{pull|push|sync|display}/...`.
///
/// Requests block for their full duration; timeouts and retries are the
/// caller's concern.
pub struct HttpRecordStore {
    server_url: String,
    client: reqwest::blocking::Client,
}

impl HttpRecordStore {
    pub fn open(server_url: &str) -> Result<Self> {
        let mut url = server_url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(Self {
            server_url: url,
            client: reqwest::blocking::Client::new(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn get_response(&self, url: &str) -> Result<(u16, String)> {
        debug!(url, "record store GET");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok((status, body))
    }

    fn fetch_record(&self, url: &str) -> Result<Record> {
        let (status, body) = self.get_response(url)?;
        match status {
            200 => Ok(decode_record(body.as_bytes())?),
            404 => Err(StoreError::NotFound(format!("record at {}", url))),
            _ => Err(StoreError::Access { status, body }),
        }
    }

    pub fn create_project(
        &self,
        project: &str,
        long_name: &str,
        description: &str,
        goals: &str,
    ) -> Result<()> {
        let url = format!("{}project/push/{}", self.server_url, project);
        debug!(url, "record store POST (create project)");
        let body = json!({
            "name": long_name,
            "description": description,
            "goals": goals,
        });
        let response = self.client.post(&url).json(&body).send()?;
        let status = response.status().as_u16();
        if status != 201 {
            return Err(StoreError::Access {
                status,
                body: response.text()?,
            });
        }
        Ok(())
    }

    pub fn update_project_info(
        &self,
        project: &str,
        long_name: &str,
        description: &str,
    ) -> Result<()> {
        let url = format!("{}project/sync/{}", self.server_url, project);
        debug!(url, "record store PUT (update project)");
        let body = json!({
            "name": long_name,
            "description": description,
        });
        let response = self.client.put(&url).json(&body).send()?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(StoreError::Access {
                status,
                body: response.text()?,
            });
        }
        Ok(())
    }

    pub fn project_info(&self, project: &str) -> Result<ProjectInfo> {
        let url = format!("{}project/pull/{}", self.server_url, project);
        let (status, body) = self.get_response(&url)?;
        if status != 200 {
            return Err(StoreError::Access { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn unsupported(&self, operation: &'static str) -> StoreError {
        warn!(
            operation,
            "remote record store cannot perform this; contact the record store administrator"
        );
        StoreError::Unsupported(operation)
    }
}

impl fmt::Display for HttpRecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interface to remote record store at {}", self.server_url)
    }
}

impl RecordStore for HttpRecordStore {
    fn list_projects(&self) -> Result<Vec<String>> {
        let url = format!("{}project/pull", self.server_url);
        let (status, body) = self.get_response(&url)?;
        if status != 200 {
            return Err(StoreError::Access { status, body });
        }
        let entries: Vec<Value> = serde_json::from_str(&body)?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get("id").and_then(Value::as_str))
            .map(String::from)
            .collect())
    }

    fn has_project(&self, project: &str) -> Result<bool> {
        let url = format!("{}project/pull/{}", self.server_url, project);
        let (status, body) = self.get_response(&url)?;
        match status {
            200 => Ok(true),
            // Absence signals during the existence probe, not errors.
            401 | 404 => Ok(false),
            _ => Err(StoreError::Access { status, body }),
        }
    }

    fn save(&self, project: &str, record: &mut Record) -> Result<()> {
        self.save_with_status(project, record, CREATE_STATUS)
    }

    fn save_with_status(&self, project: &str, record: &mut Record, status: &str) -> Result<()> {
        if !self.has_project(project)? {
            self.create_project(project, project, &record.outcome, &record.reason)?;
        }
        let wire = to_wire(record, status)?;
        if status == CREATE_STATUS {
            let url = format!("{}record/push/{}", self.server_url, project);
            debug!(url, "record store POST (push record)");
            let response = self.client.post(&url).json(&wire).send()?;
            let code = response.status().as_u16();
            let body = response.text()?;
            if !matches!(code, 200 | 201) {
                return Err(StoreError::Access { status: code, body });
            }
            // The server assigns the identity on creation.
            record.label = body.trim().to_string();
        } else {
            let url = format!(
                "{}record/sync/{}/{}",
                self.server_url, project, record.label
            );
            debug!(url, "record store PUT (sync record)");
            let response = self.client.put(&url).json(&wire).send()?;
            let code = response.status().as_u16();
            if !matches!(code, 200 | 201) {
                return Err(StoreError::Access {
                    status: code,
                    body: response.text()?,
                });
            }
        }
        Ok(())
    }

    fn get(&self, project: &str, label: &str) -> Result<Record> {
        let url = format!("{}record/display/{}/{}", self.server_url, project, label);
        let (status, body) = self.get_response(&url)?;
        match status {
            200 => Ok(decode_record(body.as_bytes())?),
            404 => Err(StoreError::NotFound(format!(
                "record {} in project {}",
                label, project
            ))),
            _ => Err(StoreError::Access { status, body }),
        }
    }

    fn list(&self, project: &str, tags: Option<&[String]>) -> Result<Vec<Record>> {
        let url = format!("{}record/pull/{}", self.server_url, project);
        let (status, body) = self.get_response(&url)?;
        if status != 200 {
            return Err(StoreError::Access { status, body });
        }
        let document: Value = serde_json::from_str(&body)?;
        let mut records = Vec::new();
        if let Some(urls) = document.get("records").and_then(Value::as_array) {
            for record_url in urls {
                if let Some(record_url) = record_url.as_str() {
                    records.push(self.fetch_record(record_url)?);
                }
            }
        }
        // The wire has no tag query; filtering happens here with the same
        // semantics as the local backend.
        Ok(records
            .into_iter()
            .filter(|record| tags_match(tags, &record.tags))
            .collect())
    }

    fn labels(&self, _project: &str, _tags: Option<&[String]>) -> Result<Vec<String>> {
        Err(self.unsupported("labels"))
    }

    fn delete(&self, _project: &str, _label: &str) -> Result<()> {
        Err(self.unsupported("delete"))
    }

    fn delete_by_tag(&self, _project: &str, _tag: &str) -> Result<usize> {
        Err(self.unsupported("delete_by_tag"))
    }

    fn most_recent(&self, _project: &str) -> Result<Option<String>> {
        Err(self.unsupported("most_recent"))
    }

    fn backup(&self) -> Result<()> {
        Err(self.unsupported("backup"))
    }

    fn remove(&self) -> Result<()> {
        Err(self.unsupported("remove"))
    }

    fn clear(&self) -> Result<()> {
        Err(self.unsupported("clear"))
    }

    fn accepts_uri(uri: &str) -> bool {
        uri.starts_with("http") && uri.contains(REMOTE_URL_FRAGMENT)
    }
}
