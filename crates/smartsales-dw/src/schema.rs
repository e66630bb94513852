//! Star schema declaration, creation and verification
//!
//! The schema is declared statically: two dimension tables (`customer`,
//! `product`) and one fact table (`sale`) whose foreign keys point at them.
//! Column names and types are the contract external SQL tools read against.

use duckdb::{Connection, Result as DuckResult};

use crate::error::{Result, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Dimension,
    Fact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub role: TableRole,
    pub primary_key: &'static str,
    pub columns: &'static [ColumnDef],
    pub foreign_keys: &'static [ForeignKey],
}

const fn col(name: &'static str, sql_type: &'static str, nullable: bool) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        nullable,
    }
}

pub const CUSTOMER: TableDef = TableDef {
    name: "customer",
    role: TableRole::Dimension,
    primary_key: "customer_id",
    columns: &[
        col("customer_id", "BIGINT", false),
        col("name", "VARCHAR", false),
        col("region", "VARCHAR", true),
        col("join_date", "DATE", true),
        col("age", "INTEGER", true),
        col("preferred_contact", "VARCHAR", true),
    ],
    foreign_keys: &[],
};

pub const PRODUCT: TableDef = TableDef {
    name: "product",
    role: TableRole::Dimension,
    primary_key: "product_id",
    columns: &[
        col("product_id", "BIGINT", false),
        col("product_name", "VARCHAR", false),
        col("category", "VARCHAR", false),
        col("unit_price_usd", "DOUBLE", false),
        col("stock", "INTEGER", true),
        col("supplier", "VARCHAR", true),
    ],
    foreign_keys: &[],
};

pub const SALE: TableDef = TableDef {
    name: "sale",
    role: TableRole::Fact,
    primary_key: "sale_id",
    columns: &[
        col("sale_id", "BIGINT", false),
        col("customer_id", "BIGINT", false),
        col("product_id", "BIGINT", false),
        col("sale_date", "DATE", false),
        col("sale_amount_usd", "DOUBLE", false),
        col("quantity", "INTEGER", false),
        col("store_id", "BIGINT", true),
        col("campaign_id", "BIGINT", true),
        col("discount_percent", "DOUBLE", true),
        col("payment_type", "VARCHAR", true),
    ],
    foreign_keys: &[
        ForeignKey {
            column: "customer_id",
            references: "customer",
            referenced_column: "customer_id",
        },
        ForeignKey {
            column: "product_id",
            references: "product",
            referenced_column: "product_id",
        },
    ],
};

const TABLES: &[TableDef] = &[CUSTOMER, PRODUCT, SALE];

impl TableDef {
    pub fn create_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("    {} {}{}", c.name, c.sql_type, null)
            })
            .collect();
        lines.push(format!("    PRIMARY KEY ({})", self.primary_key));
        for fk in self.foreign_keys {
            lines.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {} ({})",
                fk.column, fk.references, fk.referenced_column
            ));
        }
        format!("CREATE TABLE {} (\n{}\n);", self.name, lines.join(",\n"))
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

/// A key constraint as the store reports it, column lists comma-joined.
#[derive(Debug)]
struct StoreKey {
    is_primary: bool,
    columns: String,
    referenced_table: String,
    referenced_columns: String,
}

/// The declared star schema.
#[derive(Debug, Clone, Copy)]
pub struct StarSchema {
    tables: &'static [TableDef],
}

impl StarSchema {
    pub fn declared() -> Self {
        // Dimensions before the fact table that references them
        Self { tables: TABLES }
    }

    pub fn tables(&self) -> &'static [TableDef] {
        self.tables
    }

    pub fn table(&self, name: &str) -> Option<&'static TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Full DDL: drops in reverse dependency order, then creates.
    pub fn ddl(&self) -> String {
        let mut sql = String::new();
        for table in self.tables.iter().rev() {
            sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", table.name));
        }
        for table in self.tables {
            sql.push_str(&table.create_sql());
            sql.push('\n');
        }
        sql
    }

    /// Drops and recreates all tables, leaving an empty schema.
    ///
    /// Callers wrap this in a transaction so a failure never leaves a partial
    /// schema behind.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        tracing::debug!(ddl = %self.ddl(), "Recreating star schema");
        conn.execute_batch(&self.ddl())?;
        tracing::info!(tables = self.tables.len(), "Star schema created");
        Ok(())
    }

    /// Checks that the store holds exactly the declared tables, columns,
    /// primary keys and foreign keys.
    pub fn verify(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            let found = Self::store_columns(conn, table.name)?;
            let mismatch = |detail: String| WarehouseError::SchemaMismatch {
                table: table.name.to_string(),
                detail,
            };

            if found.is_empty() {
                return Err(mismatch("table does not exist".to_string()));
            }
            if found.len() != table.columns.len() {
                return Err(mismatch(format!(
                    "expected {} columns, found {}",
                    table.columns.len(),
                    found.len()
                )));
            }
            for (declared, (name, data_type, is_nullable)) in table.columns.iter().zip(&found) {
                if declared.name != name.as_str() {
                    return Err(mismatch(format!(
                        "expected column `{}`, found `{}`",
                        declared.name, name
                    )));
                }
                if !declared.sql_type.eq_ignore_ascii_case(data_type) {
                    return Err(mismatch(format!(
                        "column `{}` has type {}, expected {}",
                        name, data_type, declared.sql_type
                    )));
                }
                if declared.nullable != (is_nullable == "YES") {
                    return Err(mismatch(format!(
                        "column `{}` nullability differs from the declared model",
                        name
                    )));
                }
            }

            self.verify_keys(conn, table)?;
        }
        Ok(())
    }

    /// Checks the primary key and foreign keys of one table.
    ///
    /// A referenced table may report a mirror entry for each foreign key that
    /// points at it; those are accepted when the declared model has the
    /// matching reference.
    fn verify_keys(&self, conn: &Connection, table: &TableDef) -> Result<()> {
        let mismatch = |detail: String| WarehouseError::SchemaMismatch {
            table: table.name.to_string(),
            detail,
        };
        let keys = Self::store_keys(conn, table.name)?;

        let primary: Vec<&StoreKey> = keys.iter().filter(|k| k.is_primary).collect();
        match primary.as_slice() {
            [pk] if pk.columns == table.primary_key => {}
            [pk] => {
                return Err(mismatch(format!(
                    "primary key is ({}), expected ({})",
                    pk.columns, table.primary_key
                )))
            }
            [] => return Err(mismatch(format!("missing primary key ({})", table.primary_key))),
            _ => return Err(mismatch("more than one primary key".to_string())),
        }

        let foreign: Vec<&StoreKey> = keys.iter().filter(|k| !k.is_primary).collect();
        for declared in table.foreign_keys {
            let present = foreign.iter().any(|k| {
                k.columns == declared.column
                    && k.referenced_table == declared.references
                    && k.referenced_columns == declared.referenced_column
            });
            if !present {
                return Err(mismatch(format!(
                    "missing foreign key ({}) references {} ({})",
                    declared.column, declared.references, declared.referenced_column
                )));
            }
        }
        for key in foreign {
            let declared = table.foreign_keys.iter().any(|fk| {
                fk.column == key.columns
                    && fk.references == key.referenced_table
                    && fk.referenced_column == key.referenced_columns
            });
            let mirrored = self.table(&key.referenced_table).is_some_and(|other| {
                other.foreign_keys.iter().any(|fk| fk.references == table.name)
            });
            if !declared && !mirrored {
                return Err(mismatch(format!(
                    "unexpected foreign key ({}) references {} ({})",
                    key.columns, key.referenced_table, key.referenced_columns
                )));
            }
        }
        Ok(())
    }

    fn store_keys(conn: &Connection, table: &str) -> DuckResult<Vec<StoreKey>> {
        let mut stmt = conn.prepare(
            "SELECT constraint_type = 'PRIMARY KEY', \
                    array_to_string(constraint_column_names, ','), \
                    COALESCE(referenced_table, ''), \
                    COALESCE(array_to_string(referenced_column_names, ','), '') \
             FROM duckdb_constraints() \
             WHERE schema_name = 'main' AND table_name = ? \
               AND constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')",
        )?;
        let keys = stmt
            .query_map([table], |row| {
                Ok(StoreKey {
                    is_primary: row.get(0)?,
                    columns: row.get(1)?,
                    referenced_table: row.get(2)?,
                    referenced_columns: row.get(3)?,
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(keys)
    }

    fn store_columns(conn: &Connection, table: &str) -> DuckResult<Vec<(String, String, String)>> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? \
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(columns)
    }
}

impl Default for StarSchema {
    fn default() -> Self {
        Self::declared()
    }
}
