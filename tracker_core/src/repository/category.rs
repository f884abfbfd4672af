//! Category persistence.

use crate::db::{Database, Live, Table};
use crate::{Category, Error, Result};
use rusqlite::{params, Connection, OptionalExtension};

fn category_from_row(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn list_all_in(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare_cached("SELECT id, name FROM categories ORDER BY name ASC")?;
    let categories = stmt
        .query_map([], category_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(categories)
}

/// Categories: plain CRUD; deleting one nulls the reference on its exercises
#[derive(Clone, Debug)]
pub struct CategoryRepository {
    db: Database,
}

impl CategoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Live list of all categories, sorted by name
    pub fn observe_all(&self) -> Result<Live<Vec<Category>>> {
        self.db
            .observe(&[Table::Categories], |db| db.with_conn(list_all_in))
    }

    /// All categories, sorted by name
    pub fn list_all(&self) -> Result<Vec<Category>> {
        self.db.with_conn(list_all_in)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name FROM categories WHERE id = ?1",
                    params![id],
                    category_from_row,
                )
                .optional()?)
        })
    }

    pub fn insert(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Other("Category name must not be empty".into()));
        }
        let id = self.db.with_conn(|conn| {
            conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
            Ok(conn.last_insert_rowid())
        })?;
        self.db.notify(&[Table::Categories]);
        tracing::debug!("Inserted category {} ({})", id, name);
        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    pub fn update(&self, category: &Category) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![category.name, category.id],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "category",
                id: category.id,
            });
        }
        // Exercise lists embed the category name.
        self.db.notify(&[Table::Categories, Table::Exercises]);
        Ok(())
    }

    /// Delete a category; its exercises keep existing with no category
    pub fn delete(&self, id: i64) -> Result<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?)
        })?;
        if changed > 0 {
            self.db.notify(&[Table::Categories, Table::Exercises]);
            tracing::debug!("Deleted category {}", id);
        }
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ExerciseRepository;
    use crate::NewExercise;

    fn repo() -> (Database, CategoryRepository) {
        let db = Database::open_in_memory().unwrap();
        (db.clone(), CategoryRepository::new(db))
    }

    #[test]
    fn test_insert_and_list_sorted() {
        let (_, repo) = repo();
        repo.insert("Pull").unwrap();
        repo.insert("Legs").unwrap();
        repo.insert("Push").unwrap();

        let names: Vec<_> = repo.list_all().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Legs", "Pull", "Push"]);
    }

    #[test]
    fn test_insert_rejects_blank_name() {
        let (_, repo) = repo();
        assert!(repo.insert("   ").is_err());
    }

    #[test]
    fn test_update_and_get() {
        let (_, repo) = repo();
        let mut category = repo.insert("Lgs").unwrap();
        category.name = "Legs".into();
        repo.update(&category).unwrap();

        assert_eq!(repo.get_by_id(category.id).unwrap().unwrap().name, "Legs");
    }

    #[test]
    fn test_update_missing_category() {
        let (_, repo) = repo();
        let result = repo.update(&Category {
            id: 42,
            name: "Ghost".into(),
        });
        assert!(matches!(result, Err(Error::NotFound { id: 42, .. })));
    }

    #[test]
    fn test_delete_nulls_exercise_category() {
        let (db, repo) = repo();
        let exercises = ExerciseRepository::new(db);
        let legs = repo.insert("Legs").unwrap();
        let squat = exercises
            .insert(&NewExercise {
                title: "Squat".into(),
                has_weight: true,
                category_id: Some(legs.id),
                ..Default::default()
            })
            .unwrap();

        assert!(repo.delete(legs.id).unwrap());

        let squat = exercises.get_by_id(squat.id).unwrap().unwrap();
        assert!(squat.category.is_none());
        assert!(!squat.is_deleted);
        assert!(!repo.delete(legs.id).unwrap());
    }
}
