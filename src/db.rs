use crate::error::{Result, StoreError};
use crate::models::{Customer, Item, NewCustomer, NewItem, NewReview, Review};
use crate::serializer::EntityRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CUSTOMERS: &str = "customers";
pub const ITEMS: &str = "items";
pub const REVIEWS: &str = "reviews";

/// Constraint name for a foreign key: `fk_<table>_<column>_<referenced_table>`.
pub fn foreign_key_name(table: &str, column: &str, referred_table: &str) -> String {
    format!("fk_{}_{}_{}", table, column, referred_table)
}


/// Every row of the three tables, loaded at once. Relationship lookups walk
/// the maps instead of hitting the database again.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub customers: BTreeMap<i64, Customer>,
    pub items: BTreeMap<i64, Item>,
    pub reviews: BTreeMap<i64, Review>,
}

impl Snapshot {
    pub fn customer(&self, id: i64) -> Option<&Customer> {
        self.customers.get(&id)
    }

    pub fn item(&self, id: i64) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn review(&self, id: i64) -> Option<&Review> {
        self.reviews.get(&id)
    }

    pub fn customer_reviews(&self, customer_id: i64) -> Vec<&Review> {
        self.reviews
            .values()
            .filter(|review| review.customer_id == customer_id)
            .collect()
    }

    pub fn item_reviews(&self, item_id: i64) -> Vec<&Review> {
        self.reviews
            .values()
            .filter(|review| review.item_id == item_id)
            .collect()
    }

    // Items reached through the customer's reviews, in review order
    pub fn customer_items(&self, customer_id: i64) -> Vec<&Item> {
        self.customer_reviews(customer_id)
            .into_iter()
            .filter_map(|review| self.items.get(&review.item_id))
            .collect()
    }
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        comment: row.get(1)?,
        customer_id: row.get(2)?,
        item_id: row.get(3)?,
    })
}

fn ensure_exists(conn: &Connection, table: &str, entity: &'static str, id: i64) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE id = ?", table),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound { entity, id }),
    }
}

fn fetch_customer(conn: &Connection, id: i64) -> Result<Customer> {
    conn.query_row(
        "SELECT id, name FROM customers WHERE id = ?",
        [id],
        customer_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "Customer",
        id,
    })
}

fn fetch_item(conn: &Connection, id: i64) -> Result<Item> {
    conn.query_row(
        "SELECT id, name, price FROM items WHERE id = ?",
        [id],
        item_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound { entity: "Item", id })
}

fn fetch_review(conn: &Connection, id: i64) -> Result<Review> {
    conn.query_row(
        "SELECT id, comment, customer_id, item_id FROM reviews WHERE id = ?",
        [id],
        review_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "Review",
        id,
    })
}

fn collect_rows<T, F>(conn: &Connection, sql: &str, id: Option<i64>, map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = match id {
        Some(id) => stmt.query_map([id], map)?.collect::<rusqlite::Result<Vec<T>>>()?,
        None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<T>>>()?,
    };
    Ok(rows)
}

/// Process-wide handle over a single SQLite connection. Cloning shares the
/// connection.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    // Create a new database connection
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        info!("Database connection established at: {}", db_path);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // SQLite leaves foreign keys unenforced unless asked per connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Create the database schema
    pub async fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // 1. Customers table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );",
        )
        .map_err(|e| {
            warn!("Failed creating customers table: {}", e);
            e
        })?;

        // 2. Items table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                price REAL NOT NULL
            );",
        )
        .map_err(|e| {
            warn!("Failed creating items table: {}", e);
            e
        })?;

        // 3. Reviews join table, removed together with either endpoint
        let reviews_ddl = format!(
            "CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY,
                comment TEXT NOT NULL CHECK (length(comment) > 0),
                customer_id INTEGER NOT NULL,
                item_id INTEGER NOT NULL,
                CONSTRAINT {customer_fk} FOREIGN KEY (customer_id)
                    REFERENCES customers(id) ON DELETE CASCADE,
                CONSTRAINT {item_fk} FOREIGN KEY (item_id)
                    REFERENCES items(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS ix_reviews_customer_id ON reviews (customer_id);
            CREATE INDEX IF NOT EXISTS ix_reviews_item_id ON reviews (item_id);",
            customer_fk = foreign_key_name(REVIEWS, "customer_id", CUSTOMERS),
            item_fk = foreign_key_name(REVIEWS, "item_id", ITEMS),
        );
        conn.execute_batch(&reviews_ddl).map_err(|e| {
            warn!("Failed creating reviews table: {}", e);
            e
        })?;

        debug!("Schema ready");
        Ok(())
    }

    pub async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO customers (name) VALUES (?)", [&new.name])?;
        let customer = Customer {
            id: conn.last_insert_rowid(),
            name: new.name.clone(),
        };
        info!("Customer inserted: {}", customer);
        Ok(customer)
    }

    pub async fn get_customer(&self, id: i64) -> Result<Customer> {
        let conn = self.conn.lock().await;
        fetch_customer(&conn, id)
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        let conn = self.conn.lock().await;
        let customers = collect_rows(
            &conn,
            "SELECT id, name FROM customers ORDER BY id",
            None,
            customer_from_row,
        )?;
        debug!("Fetched {} customers", customers.len());
        Ok(customers)
    }

    pub async fn update_customer(&self, id: i64, changes: &NewCustomer) -> Result<Customer> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE customers SET name = ? WHERE id = ?",
            params![&changes.name, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "Customer",
                id,
            });
        }
        info!("Customer updated: {}", id);
        fetch_customer(&conn, id)
    }

    pub async fn delete_customer(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        if conn.execute("DELETE FROM customers WHERE id = ?", [id])? == 0 {
            return Err(StoreError::NotFound {
                entity: "Customer",
                id,
            });
        }
        info!("Customer deleted: {}", id);
        Ok(())
    }

    pub async fn insert_item(&self, new: &NewItem) -> Result<Item> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO items (name, price) VALUES (?, ?)",
            params![&new.name, new.price],
        )?;
        let item = Item {
            id: conn.last_insert_rowid(),
            name: new.name.clone(),
            price: new.price,
        };
        info!("Item inserted: {}", item);
        Ok(item)
    }

    pub async fn get_item(&self, id: i64) -> Result<Item> {
        let conn = self.conn.lock().await;
        fetch_item(&conn, id)
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let conn = self.conn.lock().await;
        let items = collect_rows(
            &conn,
            "SELECT id, name, price FROM items ORDER BY id",
            None,
            item_from_row,
        )?;
        debug!("Fetched {} items", items.len());
        Ok(items)
    }

    pub async fn update_item(&self, id: i64, changes: &NewItem) -> Result<Item> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE items SET name = ?, price = ? WHERE id = ?",
            params![&changes.name, changes.price, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { entity: "Item", id });
        }
        info!("Item updated: {}", id);
        fetch_item(&conn, id)
    }

    pub async fn delete_item(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        if conn.execute("DELETE FROM items WHERE id = ?", [id])? == 0 {
            return Err(StoreError::NotFound { entity: "Item", id });
        }
        info!("Item deleted: {}", id);
        Ok(())
    }

    pub async fn insert_review(&self, new: &NewReview) -> Result<Review> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO reviews (comment, customer_id, item_id) VALUES (?, ?, ?)",
            params![&new.comment, new.customer_id, new.item_id],
        )?;
        let review = Review {
            id: conn.last_insert_rowid(),
            comment: new.comment.clone(),
            customer_id: new.customer_id,
            item_id: new.item_id,
        };
        info!(
            customer_id = review.customer_id,
            item_id = review.item_id,
            "Review inserted: {}",
            review
        );
        Ok(review)
    }

    pub async fn get_review(&self, id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        fetch_review(&conn, id)
    }

    pub async fn list_reviews(&self) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        let reviews = collect_rows(
            &conn,
            "SELECT id, comment, customer_id, item_id FROM reviews ORDER BY id",
            None,
            review_from_row,
        )?;
        debug!("Fetched {} reviews", reviews.len());
        Ok(reviews)
    }

    /// Only the comment is editable; moving a review to another customer or
    /// item means deleting it and writing a new one.
    pub async fn update_review(&self, id: i64, comment: &str) -> Result<Review> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE reviews SET comment = ? WHERE id = ?",
            params![comment, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "Review",
                id,
            });
        }
        info!("Review updated: {}", id);
        fetch_review(&conn, id)
    }

    pub async fn delete_review(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        if conn.execute("DELETE FROM reviews WHERE id = ?", [id])? == 0 {
            return Err(StoreError::NotFound {
                entity: "Review",
                id,
            });
        }
        info!("Review deleted: {}", id);
        Ok(())
    }

    pub async fn customer_reviews(&self, customer_id: i64) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        ensure_exists(&conn, CUSTOMERS, "Customer", customer_id)?;
        collect_rows(
            &conn,
            "SELECT id, comment, customer_id, item_id FROM reviews
             WHERE customer_id = ? ORDER BY id",
            Some(customer_id),
            review_from_row,
        )
    }

    pub async fn item_reviews(&self, item_id: i64) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        ensure_exists(&conn, ITEMS, "Item", item_id)?;
        collect_rows(
            &conn,
            "SELECT id, comment, customer_id, item_id FROM reviews
             WHERE item_id = ? ORDER BY id",
            Some(item_id),
            review_from_row,
        )
    }

    pub async fn review_customer(&self, review_id: i64) -> Result<Customer> {
        let conn = self.conn.lock().await;
        let review = fetch_review(&conn, review_id)?;
        fetch_customer(&conn, review.customer_id)
    }

    pub async fn review_item(&self, review_id: i64) -> Result<Item> {
        let conn = self.conn.lock().await;
        let review = fetch_review(&conn, review_id)?;
        fetch_item(&conn, review.item_id)
    }

    /// Items the customer reached through reviews, in review order. An item
    /// reviewed twice shows up twice.
    pub async fn customer_items(&self, customer_id: i64) -> Result<Vec<Item>> {
        let conn = self.conn.lock().await;
        ensure_exists(&conn, CUSTOMERS, "Customer", customer_id)?;
        collect_rows(
            &conn,
            "SELECT i.id, i.name, i.price
             FROM reviews r
             JOIN items i ON i.id = r.item_id
             WHERE r.customer_id = ?
             ORDER BY r.id",
            Some(customer_id),
            item_from_row,
        )
    }

    // Appending an item to a customer writes the joining review
    pub async fn add_customer_item(
        &self,
        customer_id: i64,
        item_id: i64,
        comment: &str,
    ) -> Result<Review> {
        self.insert_review(&NewReview {
            comment: comment.to_string(),
            customer_id,
            item_id,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let conn = self.conn.lock().await;
        let customers = collect_rows(
            &conn,
            "SELECT id, name FROM customers",
            None,
            customer_from_row,
        )?;
        let items = collect_rows(&conn, "SELECT id, name, price FROM items", None, item_from_row)?;
        let reviews = collect_rows(
            &conn,
            "SELECT id, comment, customer_id, item_id FROM reviews",
            None,
            review_from_row,
        )?;

        Ok(Snapshot {
            customers: customers.into_iter().map(|c| (c.id, c)).collect(),
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            reviews: reviews.into_iter().map(|r| (r.id, r)).collect(),
        })
    }

    /// Loads the root row and the rows one review away from it: a customer
    /// with its reviews and their items, an item with its reviews and their
    /// customers, or a review with both endpoints. That covers every default
    /// serialized shape; derived fields may need `snapshot` instead.
    pub async fn snapshot_around(&self, root: EntityRef) -> Result<Snapshot> {
        let conn = self.conn.lock().await;
        let mut snapshot = Snapshot::default();

        match root {
            EntityRef::Customer(id) => {
                snapshot.customers.insert(id, fetch_customer(&conn, id)?);
                let reviews = collect_rows(
                    &conn,
                    "SELECT id, comment, customer_id, item_id FROM reviews WHERE customer_id = ?",
                    Some(id),
                    review_from_row,
                )?;
                let items = collect_rows(
                    &conn,
                    "SELECT DISTINCT i.id, i.name, i.price
                     FROM items i
                     JOIN reviews r ON r.item_id = i.id
                     WHERE r.customer_id = ?",
                    Some(id),
                    item_from_row,
                )?;
                snapshot.reviews.extend(reviews.into_iter().map(|r| (r.id, r)));
                snapshot.items.extend(items.into_iter().map(|i| (i.id, i)));
            }
            EntityRef::Item(id) => {
                snapshot.items.insert(id, fetch_item(&conn, id)?);
                let reviews = collect_rows(
                    &conn,
                    "SELECT id, comment, customer_id, item_id FROM reviews WHERE item_id = ?",
                    Some(id),
                    review_from_row,
                )?;
                let customers = collect_rows(
                    &conn,
                    "SELECT DISTINCT c.id, c.name
                     FROM customers c
                     JOIN reviews r ON r.customer_id = c.id
                     WHERE r.item_id = ?",
                    Some(id),
                    customer_from_row,
                )?;
                snapshot.reviews.extend(reviews.into_iter().map(|r| (r.id, r)));
                snapshot.customers.extend(customers.into_iter().map(|c| (c.id, c)));
            }
            EntityRef::Review(id) => {
                let review = fetch_review(&conn, id)?;
                let customer = fetch_customer(&conn, review.customer_id)?;
                let item = fetch_item(&conn, review.item_id)?;
                snapshot.customers.insert(customer.id, customer);
                snapshot.items.insert(item.id, item);
                snapshot.reviews.insert(id, review);
            }
        }

        debug!(
            customers = snapshot.customers.len(),
            items = snapshot.items.len(),
            reviews = snapshot.reviews.len(),
            "Loaded neighbourhood of {:?}",
            root
        );
        Ok(snapshot)
    }

    /// Closes the connection if this is the last handle. Other clones keep it
    /// open, in which case it is closed when the last one drops.
    pub async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                mutex.into_inner().close().map_err(|(_, e)| e)?;
                info!("Database connection closed");
            }
            Err(_) => warn!("Database still shared, deferring close to last handle"),
        }
        Ok(())
    }
}
