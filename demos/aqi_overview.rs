//! End-to-end tour: AQI, rankings, level timeline, pollution types and a
//! wind layer over a handful of in-memory rows.
//!
//! Run with: cargo run --example aqi_overview

use air_quality_core::{
    build_wind_flow, build_wind_vectors, classify_levels, compute_aqi, compute_aqi_ranking,
    compute_level_timeline, compute_type_by_region, rows_to_scatter, DayEntry, RegionIndex, Row,
    WindFlowConfig, WindVectorConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

fn rows(value: serde_json::Value) -> Vec<Row> {
    serde_json::from_value(value).unwrap_or_default()
}

fn main() {
    let references = rows(json!([
        {"province": "北京市|北京市", "city": "北京市|北京市", "longitude": 116.40, "latitude": 39.90},
        {"province": "河北省|河北省", "city": "石家庄市|石家莊市", "longitude": 114.51, "latitude": 38.04},
        {"province": "广东省|廣東省", "city": "广州市|廣州市", "longitude": 113.26, "latitude": 23.13},
    ]));
    let index = RegionIndex::from_rows(&references);
    println!("Region index: {} keys", index.len());

    let day1 = rows(json!([
        {"province": "北京", "city": "北京", "pm25": 40, "pm10": 60, "so2": 10, "no2": 20, "co": 1, "o3": 50, "u": 2.0, "v": 1.5},
        {"province": "河北", "city": "石家莊", "pm25": 130, "pm10": 180, "so2": 45, "no2": 50, "co": 2.1, "o3": 30, "u": -1.0, "v": 0.5},
        {"province": "广东", "city": "广州", "pm25": 20, "pm10": 40, "so2": 8, "no2": 35, "co": 0.8, "o3": 170, "u": 0.2, "v": 3.0},
    ]));
    let day2 = rows(json!([
        {"province": "北京", "city": "北京", "pm25": 90, "pm10": 120, "o3": 40},
        {"province": "河北", "city": "石家莊", "pm25": 260, "pm10": 300, "o3": 20},
        {"province": "广东", "city": "广州", "pm25": 15, "pm10": 30, "o3": 190},
    ]));

    // Per-row AQI
    println!("\nAQI per row:");
    for row in &day1 {
        let result = compute_aqi(row);
        println!(
            "  {:<6} AQI {:>6.1}  primary {}",
            row.get("city").and_then(|v| v.as_str()).unwrap_or("?"),
            result.aqi,
            result.primary_pollutant
        );
    }

    // Ranking over both days
    let all: Vec<Row> = day1.iter().chain(day2.iter()).cloned().collect();
    println!("\nProvince ranking:");
    for item in compute_aqi_ranking(&all, "province", 15) {
        println!("  {:<6} {:>6.1}  {:?}", item.name, item.aqi, item.primary_pollutant);
    }

    // Level histogram and timeline
    let levels = classify_levels(&all, "pm25");
    println!("\nPM2.5 levels: {}", serde_json::to_string(&levels).unwrap_or_default());

    let entries = vec![
        DayEntry::new("2015-01-01", day1.clone()),
        DayEntry::new("2015-01-02", day2),
    ];
    let timeline = compute_level_timeline(&entries, "pm25");
    println!("Level timeline: {}", serde_json::to_string(&timeline).unwrap_or_default());

    // Pollution types
    println!("\nPollution types:");
    for region in compute_type_by_region(&all, "city") {
        println!("  {:<6} {}", region.name, region.pollution_type.name());
    }

    // Map layers
    let scatter = rows_to_scatter(&day1, "pm25", Some(&index));
    println!(
        "\nScatter: {} points ({} matched, {} failed)",
        scatter.items.len(),
        scatter.stats.matched,
        scatter.stats.failed
    );

    let vectors = build_wind_vectors(&day1, Some(&index), &WindVectorConfig::default());
    println!("Wind vectors: {}", vectors.items.len());

    let mut rng = StdRng::seed_from_u64(42);
    let flow = build_wind_flow(&day1, Some(&index), &WindFlowConfig::default(), &mut rng);
    println!("Wind flow lines: {}", flow.items.len());
}
