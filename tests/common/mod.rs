#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vellum::{transport::MemoryStore, ClientOptions, DataContext, Document};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub views: i64,
}

impl Document for Post {
    const TYPE: &'static str = "post";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl Document for Author {
    const TYPE: &'static str = "author";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

pub fn post(id: Option<&str>, title: &str) -> Post {
    Post {
        id: id.map(str::to_owned),
        title: title.to_owned(),
        views: 0,
    }
}

pub fn author(id: Option<&str>, name: &str) -> Author {
    Author {
        id: id.map(str::to_owned),
        name: name.to_owned(),
    }
}

pub fn make_context() -> (DataContext, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let context = DataContext::new(
        ClientOptions::new("https://store.example", "integration"),
        store.clone(),
    );
    (context, store)
}
