// src/models/customer.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,      // Primary key
    pub name: String, // Display name of the customer
}

// Payload used to create or rename a customer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub name: String,
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Customer {}, {}>", self.id, self.name)
    }
}
