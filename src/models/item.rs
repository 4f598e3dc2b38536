// src/models/item.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,      // Primary key
    pub name: String, // Item name
    pub price: f64,   // Unit price
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub price: f64,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug keeps the trailing ".0" on whole prices
        write!(f, "<Item {}, {}, {:?}>", self.id, self.name, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_decimal_point() {
        let desk = Item {
            id: 2,
            name: "Desk".into(),
            price: 120.0,
        };
        assert_eq!(desk.to_string(), "<Item 2, Desk, 120.0>");

        let lamp = Item {
            id: 3,
            name: "Lamp".into(),
            price: 9.5,
        };
        assert_eq!(lamp.to_string(), "<Item 3, Lamp, 9.5>");
    }
}
