use std::fs;

use data_ingestion::config::load_config;
use data_ingestion::loader::load_market_rows;
use data_ingestion::{DataIngestionError, IoConfig, MINUTE_MS};
use serde::Deserialize;

const HEADER: &str = "open_time,open,high,low,close,volume,top_bid_price,top_ask_price,spread,bid_ask_ratio,final_sentiment_score";

#[derive(Deserialize)]
struct Doc {
    io: IoConfig,
}

fn io_for(dir: &std::path::Path) -> IoConfig {
    let toml = format!(
        r#"
        [io]
        input_path = "{}"
        timestamp_column = "open_time"
        labeled_table_path = "labeled.parquet"
        output_dir = "out"
        "#,
        dir.join("raw.csv").display()
    );
    let path = dir.join("pipeline.toml");
    fs::write(&path, toml).unwrap();
    let doc: Doc = load_config(path.to_str().unwrap()).unwrap();
    doc.io
}

#[test]
fn loads_cleans_and_orders_a_raw_table() {
    let tmp = tempfile::tempdir().unwrap();
    let csv = [
        HEADER,
        "2024-03-01 00:02:00,3,3.5,2.5,3.2,30,3.1,3.3,0.2,1.2,0.1",
        "2024-03-01 00:00:00,1,1.5,0.5,1.2,10,,1.3,0.2,1.0,",
        "2024-03-01 00:01:00,2,2.5,1.5,2.2,20,2.1,2.3,0.2,abc,0.3",
        "2024-03-01 00:01:00,9,9,9,9,9,9,9,9,9,9",
        "2024-03-01 00:05:00,4,4.5,3.5,4.2,40,4.1,4.3,0.2,1.4,0.2",
    ]
    .join("\n");
    fs::write(tmp.path().join("raw.csv"), csv).unwrap();

    let rows = load_market_rows(&io_for(tmp.path())).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(rows[1].timestamp - rows[0].timestamp, MINUTE_MS);

    // duplicate minute keeps the first occurrence
    assert_eq!(rows[1].open, 2.0);
    // leading gap is back-filled, interior gap forward-filled
    assert_eq!(rows[0].top_bid_price, 2.1);
    assert_eq!(rows[0].final_sentiment_score, 0.3);
    assert_eq!(rows[1].bid_ask_ratio, 1.0);
}

#[test]
fn reports_every_missing_column() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("raw.csv"),
        "open_time,open,close\n2024-03-01 00:00:00,1,1\n",
    )
    .unwrap();

    match load_market_rows(&io_for(tmp.path())) {
        Err(DataIngestionError::MissingColumns(missing)) => {
            assert_eq!(
                missing,
                vec![
                    "high",
                    "low",
                    "volume",
                    "top_bid_price",
                    "top_ask_price",
                    "spread",
                    "bid_ask_ratio",
                    "final_sentiment_score"
                ]
            );
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_market_rows(&io_for(tmp.path())),
        Err(DataIngestionError::IoError(_))
    ));
}
