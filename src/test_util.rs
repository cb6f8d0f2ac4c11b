//! Shared document types for unit tests.

use serde::{Deserialize, Serialize};

use crate::document::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) title: String,
}

impl Document for Post {
    const TYPE: &'static str = "post";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Author {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
}

impl Document for Author {
    const TYPE: &'static str = "author";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

pub(crate) fn post(id: Option<&str>, title: &str) -> Post {
    Post {
        id: id.map(str::to_owned),
        title: title.to_owned(),
    }
}
