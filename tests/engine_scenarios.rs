//! End-to-end pipeline scenarios driven through the public engine API,
//! from raw CSV bytes to the verification report.

use fleet_telemetry::config::EngineConfig;
use fleet_telemetry::domain::{DistanceSource, RawBatch, RuleCode, SpeedSource};
use fleet_telemetry::ingest;
use fleet_telemetry::pipeline::processing::mapper::ColumnMapper;
use fleet_telemetry::pipeline::processing::quality::QualityEngine;
use fleet_telemetry::pipeline::TelemetryEngine;

fn batch(csv: &str) -> RawBatch {
    ingest::decode_batch(csv.as_bytes(), "scenario.csv").unwrap()
}

fn engine() -> TelemetryEngine {
    TelemetryEngine::new(EngineConfig::default())
}

#[test]
fn stationary_odometer_with_speed_is_flagged_and_excluded() {
    let input = batch(
        "timestamp;vehicle_id;odometer;speed\n\
         2024-03-01 08:00:00;V1;50000;50\n\
         2024-03-01 08:01:00;V1;50000;50\n",
    );
    let output = engine().process_batch(&input).unwrap();

    let second = &output.cleaned_records[1];
    assert!(second.has_rule(RuleCode::R1));
    assert!(second.anomaly_flag);
    assert!(!second.include_in_totals);
    assert!(output.quality_report.inconsistent_excluded >= 1);
}

#[test]
fn missing_speed_is_estimated_from_odometer_and_time() {
    let input = batch(
        "timestamp;vehicle_id;odometer;speed\n\
         2024-03-01 08:00:00;V1;41000;0\n\
         2024-03-01 09:00:00;V1;41100;0\n",
    );
    let output = engine().process_batch(&input).unwrap();

    let second = &output.cleaned_records[1];
    assert!(second.has_rule(RuleCode::R2));
    assert!((second.speed - 100.0).abs() < 0.5);
    assert!(second.estimated_flag);
    assert!(second.include_in_totals);
}

#[test]
fn impossible_speed_is_truncated_and_excluded() {
    let input = batch(
        "timestamp;vehicle_id;odometer;speed\n\
         2024-03-01 08:00:00;V1;1000;300\n",
    );
    let output = engine().process_batch(&input).unwrap();

    let record = &output.cleaned_records[0];
    assert_eq!(record.speed, 250.0);
    assert!(record.has_rule(RuleCode::R5));
    assert!(record.anomaly_flag);
    assert!(!record.include_in_totals);
    assert_eq!(output.quality_report.speed_outliers_marked, 1);
}

#[test]
fn dead_speed_sensor_over_real_distance_is_resolved() {
    // 300 odometer readings climbing one km at a time, the speed sensor
    // stuck at zero and no usable timestamps to estimate from.
    let mut csv = String::from("vehicle_id;odometer;speed\n");
    for i in 0..300 {
        csv.push_str(&format!("V1;{};0\n", 50000 + i));
    }
    let output = engine().process_batch(&batch(&csv)).unwrap();

    let metrics = &output.reconciled_metrics;
    assert!(metrics.sensor_issue);
    assert_eq!(metrics.speed_source, SpeedSource::OdometerBased);
    assert_eq!(metrics.distance_source, DistanceSource::Odometer);
    assert!(metrics.max_speed > 0.0);
    assert!(metrics.total_km > 250.0);
}

#[test]
fn teleporting_vehicle_is_flagged_but_kept() {
    // ~400 km of latitude in ten minutes
    let config = EngineConfig {
        gps_jump_distance_km: 300.0,
        ..EngineConfig::default()
    };
    let input = batch(
        "timestamp;vehicle_id;lat;lon;speed\n\
         2024-03-01 08:00:00;V1;0.0;0.0;0\n\
         2024-03-01 08:10:00;V1;3.6;0.0;0\n",
    );
    let output = TelemetryEngine::new(config).process_batch(&input).unwrap();

    assert_eq!(output.quality_report.gps_jumps_marked, 1);
    assert_eq!(output.cleaned_records.len(), 2);
    assert!(output.cleaned_records[1].gps_jump);
}

#[test]
fn brazilian_export_formats_are_parsed() {
    // day-first dates, decimal commas, hour 24 rolling into the next day
    let input = batch(
        "data;id_veiculo;odômetro;velocidade\n\
         01/03/2024 23:59:00;ABC1234;50000,5;42\n\
         2024-03-01 24:00:30;ABC1234;50001,0;40\n",
    );
    let output = engine().process_batch(&input).unwrap();

    let first = &output.cleaned_records[0];
    assert_eq!(first.odometer, Some(50000.5));
    assert_eq!(
        first.timestamp.map(|t| t.to_string()),
        Some("2024-03-01 23:59:00".to_string())
    );
    let second = &output.cleaned_records[1];
    assert_eq!(
        second.timestamp.map(|t| t.to_string()),
        Some("2024-03-02 00:00:30".to_string())
    );
}

#[test]
fn odometer_reset_never_produces_negative_deltas() {
    let input = batch(
        "timestamp;vehicle_id;odometer;speed\n\
         2024-03-01 08:00:00;V1;89990;40\n\
         2024-03-01 08:05:00;V1;90000;40\n\
         2024-03-01 08:10:00;V1;15;40\n\
         2024-03-01 08:15:00;V1;25;40\n",
    );
    let output = engine().process_batch(&input).unwrap();

    for record in &output.cleaned_records {
        assert!(record.km_delta >= 0.0, "negative delta at {:?}", record.timestamp);
    }
    // the reset record contributes nothing; the rule trail explains it
    assert_eq!(output.cleaned_records[2].km_delta, 0.0);
    assert!(output
        .quality_report
        .anomalies
        .iter()
        .any(|a| a.contains("odometer reset")));
}

#[test]
fn quality_pass_is_idempotent_on_a_clean_batch() {
    let mut csv = String::from("timestamp;vehicle_id;odometer;speed\n");
    for i in 0..10u32 {
        let speed = if i == 0 { 0 } else { 50 };
        csv.push_str(&format!(
            "2024-03-01 08:{:02}:00;V1;{};{}\n",
            i,
            1000 + i,
            speed
        ));
    }
    let (records, _) = ColumnMapper::map(&batch(&csv));

    let quality = QualityEngine::new(EngineConfig::default());
    let (first_pass, first_report) = quality.apply(records);
    let (second_pass, second_report) = quality.apply(first_pass.clone());

    assert_eq!(first_pass, second_pass);
    assert_eq!(first_report, second_report);
}

#[test]
fn totals_and_trips_stay_coherent() {
    // a parked first fix, then 50 km of steady driving
    let mut csv = String::from("timestamp;vehicle_id;odometer;speed\n\
                                2024-03-01 08:00:00;V1;1000;0\n");
    for i in 1..=50u32 {
        csv.push_str(&format!("2024-03-01 08:{:02}:00;V1;{};50\n", i, 1000 + i));
    }
    let output = engine().process_batch(&batch(&csv)).unwrap();

    let metrics = &output.reconciled_metrics;
    assert!(metrics.total_km > 0.0);
    assert!(metrics.max_speed > 0.0);
    assert!(!metrics.sensor_issue);

    let trip_total: f64 = output.trips.iter().map(|t| t.distance_km).sum();
    let deviation = (trip_total - metrics.total_km).abs() / metrics.total_km;
    assert!(
        deviation <= 0.05,
        "trip total {trip_total} strays from batch total {}",
        metrics.total_km
    );
}

#[test]
fn vehicles_are_reported_distinctly() {
    let input = batch(
        "timestamp;vehicle_id;odometer;speed\n\
         2024-03-01 08:00:00;A;100;0\n\
         2024-03-01 08:10:00;A;105;30\n\
         2024-03-01 08:00:00;B;200;0\n\
         2024-03-01 08:10:00;B;202;20\n",
    );
    let output = engine().process_batch(&input).unwrap();

    assert_eq!(output.verification.distinct_vehicles, 2);
    assert_eq!(output.verification.rows_kept, 4);
    assert_eq!(output.verification.checksum.len(), 16);
}

#[test]
fn comma_delimited_exports_work_too() {
    let input = batch(
        "timestamp,vehicle_id,odometer,speed\n\
         2024-03-01 08:00:00,V1,1000,0\n\
         2024-03-01 08:30:00,V1,1020,60\n",
    );
    let output = engine().process_batch(&input).unwrap();
    assert!((output.reconciled_metrics.total_km - 20.0).abs() < 1e-9);
}
