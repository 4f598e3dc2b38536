// src/models/review.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Join record between a customer and an item. The comment is the edge data
/// and is never empty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub comment: String,  // Content of the review
    pub customer_id: i64, // Customer who wrote the review
    pub item_id: i64,     // Item the review is about
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewReview {
    pub comment: String,
    pub customer_id: i64,
    pub item_id: i64,
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Review {}, {}>", self.id, self.comment)
    }
}
