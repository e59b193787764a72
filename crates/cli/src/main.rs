//! liteproxy-cache: offline inspection of the proxy's cache store.
//!
//! Reads the same configuration as the proxy, so it targets whichever
//! backend the proxy is configured with. Output is pretty JSON on stdout.

mod cli;

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use liteproxy_core::cache::{self, CacheStore, RecordKey, RecordScope};
use liteproxy_core::codec::from_canonical;
use liteproxy_core::AppConfig;

use cli::{Cli, Commands, PurgeArgs, RecordArgs, ScopeArgs};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;
    let store = cache::open_store(&config.cache).await.context("opening cache store")?;

    let mut out = std::io::stdout().lock();
    execute(store.as_ref(), &cli.command, &mut out).await
}

async fn execute(store: &dyn CacheStore, command: &Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Get(args) => get(store, args, out).await,
        Commands::List(args) => list(store, args, out).await,
        Commands::Purge(args) => purge(store, args, out).await,
    }
}

async fn get(store: &dyn CacheStore, args: &RecordArgs, out: &mut impl Write) -> Result<()> {
    let key = RecordKey::new(
        &args.scope.identity,
        &args.scope.resource,
        args.scope.namespace.as_deref().unwrap_or_default(),
        &args.name,
    );
    let Some(bytes) = store.get(&key).await? else {
        bail!("{} \"{}\" is not cached for identity {:?}", key.resource, key.name, key.identity);
    };
    let object = from_canonical(&bytes)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&object)?)?;
    Ok(())
}

async fn list(store: &dyn CacheStore, args: &ScopeArgs, out: &mut impl Write) -> Result<()> {
    let mut items = Vec::new();
    for bytes in store.list(&scope(args)).await? {
        match from_canonical(&bytes) {
            Ok(object) => items.push(object.into_value()),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable record"),
        }
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&Value::Array(items))?)?;
    Ok(())
}

async fn purge(store: &dyn CacheStore, args: &PurgeArgs, out: &mut impl Write) -> Result<()> {
    let removed = match &args.name {
        Some(name) => {
            let key = RecordKey::new(
                &args.scope.identity,
                &args.scope.resource,
                args.scope.namespace.as_deref().unwrap_or_default(),
                name,
            );
            u64::from(store.delete(&key).await?)
        }
        None => store.delete_scope(&scope(&args.scope)).await?,
    };
    writeln!(out, "{}", serde_json::json!({ "removed": removed }))?;
    Ok(())
}

fn scope(args: &ScopeArgs) -> RecordScope {
    RecordScope {
        identity: args.identity.clone(),
        resource: args.resource.clone(),
        namespace: args.namespace.clone().filter(|ns| !ns.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liteproxy_core::cache::CacheDb;
    use liteproxy_core::codec::to_canonical;
    use liteproxy_core::resource::Object;
    use serde_json::json;

    async fn seeded() -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        for (ns, name) in [("a", "p1"), ("a", "p2"), ("b", "p3")] {
            let object = Object::from_value(json!({"metadata": {"name": name, "namespace": ns}})).unwrap();
            let key = RecordKey::new("kubelet", "pods", ns, name);
            db.upsert(&key, &to_canonical(&object).unwrap()).await.unwrap();
        }
        db
    }

    async fn run_args(store: &dyn CacheStore, args: &[&str]) -> Result<Value> {
        let cli = Cli::try_parse_from(std::iter::once("liteproxy-cache").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        execute(store, &cli.command, &mut out).await?;
        Ok(serde_json::from_slice(&out)?)
    }

    #[tokio::test]
    async fn test_get_prints_object() {
        let db = seeded().await;
        let value = run_args(&db, &["get", "--identity", "kubelet", "--resource", "pods", "--namespace", "a", "--name", "p2"])
            .await
            .unwrap();
        assert_eq!(value["metadata"]["name"], "p2");
    }

    #[tokio::test]
    async fn test_get_miss_is_error() {
        let db = seeded().await;
        let result = run_args(&db, &["get", "--identity", "other", "--resource", "pods", "--namespace", "a", "--name", "p2"]).await;
        assert!(result.unwrap_err().to_string().contains("not cached"));
    }

    #[tokio::test]
    async fn test_list_scopes_by_namespace() {
        let db = seeded().await;
        let all = run_args(&db, &["list", "--identity", "kubelet", "--resource", "pods"]).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);

        let one_ns = run_args(&db, &["list", "--identity", "kubelet", "--resource", "pods", "--namespace", "a"]).await.unwrap();
        let names: Vec<_> = one_ns.as_array().unwrap().iter().map(|o| o["metadata"]["name"].clone()).collect();
        assert_eq!(names, vec![json!("p1"), json!("p2")]);
    }

    #[tokio::test]
    async fn test_purge_reports_count() {
        let db = seeded().await;
        let single = run_args(&db, &["purge", "--identity", "kubelet", "--resource", "pods", "--namespace", "b", "--name", "p3"])
            .await
            .unwrap();
        assert_eq!(single, json!({"removed": 1}));

        let scope = run_args(&db, &["purge", "--identity", "kubelet", "--resource", "pods"]).await.unwrap();
        assert_eq!(scope, json!({"removed": 2}));

        let empty = run_args(&db, &["list", "--identity", "kubelet", "--resource", "pods"]).await.unwrap();
        assert_eq!(empty, json!([]));
    }
}
