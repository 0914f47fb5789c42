use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

/// An ordered list of SQL migrations; version N applies `migrations[N - 1]`.
pub struct Schema {
    pub name: &'static str,
    pub migrations: &'static [&'static str],
}

impl Schema {
    pub fn current_version(&self) -> i32 {
        self.migrations.len() as i32
    }
}

pub fn run_migrations(conn: &mut Connection, schema: &Schema) -> Result<()> {
    let current = schema.current_version();
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > current {
        bail!(
            "{} database version ({}) is newer than supported schema ({})",
            schema.name,
            version,
            current
        );
    }

    if version == current {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < current {
        let next_version = version + 1;
        apply_migration(&tx, schema, next_version)
            .with_context(|| format!("{} migration to version {next_version} failed", schema.name))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", current)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, schema: &Schema, version: i32) -> Result<()> {
    let Some(sql) = usize::try_from(version - 1)
        .ok()
        .and_then(|index| schema.migrations.get(index))
    else {
        bail!("unknown migration target version: {version}");
    };

    tx.execute_batch(sql)
        .with_context(|| format!("failed to execute {} schema v{version}", schema.name))
}
