//! # Seed Data Generator
//!
//! Populates a development database with a storefront catalog and fresh
//! stock ledgers.
//!
//! ## Usage
//! ```bash
//! # Built-in merch catalog
//! cargo run -p holdfast-db --bin seed
//!
//! # Catalog from a JSON array of ProductInfo
//! cargo run -p holdfast-db --bin seed -- --catalog ./catalog.json
//!
//! # Specify database path and stock per product
//! cargo run -p holdfast-db --bin seed -- --db ./data/holdfast.db --stock 25
//! ```
//!
//! Re-running is safe: existing products are restocked, and units that are
//! currently held stay held.

use std::env;

use holdfast_core::validation::{validate_product_id, validate_stock_levels};
use holdfast_core::ProductInfo;
use holdfast_db::{DbConfig, SqliteStore};

/// Built-in catalog: (id prefix, name, per-order cap)
const MERCH: &[(&str, &str, i64)] = &[
    ("TEE", "Logo Tee", 5),
    ("HOODIE", "Zip Hoodie", 2),
    ("CAP", "Dad Cap", 3),
    ("BEANIE", "Knit Beanie", 3),
    ("TOTE", "Canvas Tote", 4),
    ("MUG", "Enamel Mug", 6),
    ("STICKER", "Sticker Pack", 10),
    ("POSTER", "Tour Poster", 2),
];

/// Size variants for apparel
const SIZES: &[&str] = &["S", "M", "L", "XL"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./holdfast_dev.db");
    let mut catalog_path: Option<String> = None;
    let mut stock: i64 = 50;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--catalog" | "-c" => {
                if i + 1 < args.len() {
                    catalog_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Holdfast Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./holdfast_dev.db)");
                println!("  -c, --catalog <FILE>   JSON array of products to load instead of the built-in catalog");
                println!("  -s, --stock <N>        Units per built-in product (default: 50)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Holdfast Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);

    let products = match &catalog_path {
        Some(path) => {
            println!("Catalog:  {}", path);
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<ProductInfo>>(&raw)?
        }
        None => {
            println!("Catalog:  built-in ({} units each)", stock);
            builtin_catalog(stock)
        }
    };
    println!();

    let store = SqliteStore::open(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let start = std::time::Instant::now();
    let mut loaded = 0;

    for product in &products {
        let checks = validate_product_id(&product.product_id).and_then(|_| {
            validate_stock_levels(
                product.total_stock,
                product.min_order_quantity,
                product.max_order_quantity,
            )
        });
        if let Err(e) = checks {
            eprintln!("Skipping {}: {}", product.product_id, e);
            continue;
        }

        match store.upsert_product(product).await {
            Ok(ledger) => {
                loaded += 1;
                println!(
                    "  {:<16} total {:>4}  available {:>4}  held {:>4}",
                    product.product_id, ledger.total_stock, ledger.available_stock, ledger.reserved_stock
                );
            }
            Err(e) => eprintln!("Failed to load {}: {}", product.product_id, e),
        }
    }

    println!();
    println!("✓ Loaded {} of {} products in {:?}", loaded, products.len(), start.elapsed());
    println!("  Catalog now has {} products", store.product_count().await?);

    store.database().close().await;
    Ok(())
}

fn builtin_catalog(stock: i64) -> Vec<ProductInfo> {
    let mut products = Vec::new();

    for (prefix, name, cap) in MERCH {
        let apparel = matches!(*prefix, "TEE" | "HOODIE");
        if apparel {
            for size in SIZES {
                products.push(
                    ProductInfo::new(format!("{}-{}", prefix, size), format!("{} ({})", name, size), stock)
                        .with_max_order_quantity(*cap),
                );
            }
        } else {
            products.push(ProductInfo::new(*prefix, *name, stock).with_max_order_quantity(*cap));
        }
    }

    products
}
