//! Basic usage example for strata_db
//!
//! This example walks through revisions, snapshot reads and the name index.

use strata_db::store::{IndexType, ResourceConfig, ResourceManager};

fn main() -> strata_db::store::Result<()> {
    println!("=== strata_db Basic Usage ===\n");

    // 1. Create a resource on a temporary file
    let path = std::env::temp_dir().join("strata_basic_usage.db");
    let _ = std::fs::remove_file(&path);
    let resource = ResourceManager::open(&path, ResourceConfig::default())?;
    println!("Created resource at {}", path.display());
    println!("Bootstrap revision: {}\n", resource.latest_revision());

    // 2. Commit a first revision
    let mut wtx = resource.begin_write_trx()?;
    let greeting = wtx.create_record(b"hello".to_vec(), IndexType::Record)?;
    let farewell = wtx.create_record(b"goodbye".to_vec(), IndexType::Record)?;
    let name = wtx.create_name("greeting")?;
    let rev1 = wtx.commit()?;
    println!("Committed revision {rev1}: records {greeting} and {farewell}, name key {name}");

    // 3. Update one record and delete the other
    wtx.set_record(greeting, b"hello again".to_vec(), IndexType::Record)?;
    wtx.remove_record(farewell, IndexType::Record)?;
    let rev2 = wtx.commit()?;
    wtx.close();
    println!("Committed revision {rev2}\n");

    // 4. Read both revisions
    for revision in [rev1, rev2] {
        let rtx = resource.begin_read_trx_at(revision)?;
        let show = |key| match rtx.get_record(key, IndexType::Record) {
            Ok(Some(value)) => String::from_utf8_lossy(&value).into_owned(),
            Ok(None) => "<absent>".to_string(),
            Err(err) => format!("<error: {err}>"),
        };
        println!("Revision {revision} (committed at {} ms)", rtx.revision_timestamp());
        println!("  record {greeting}: {}", show(greeting));
        println!("  record {farewell}: {}", show(farewell));
        println!("  name {name}: {:?}", rtx.get_name(name)?);
    }

    // 5. Reopen and check that the last revision survived
    drop(resource);
    let resource = ResourceManager::open(&path, ResourceConfig::default())?;
    println!("\nReopened: latest revision {}", resource.latest_revision());

    println!("\n{}", resource.metrics().snapshot());
    let _ = std::fs::remove_file(&path);
    Ok(())
}
