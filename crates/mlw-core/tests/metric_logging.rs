use mlw_core::{latest, MemoryLogger, MetricValue, RunLogger};

#[test]
fn memory_logger_appends_in_order() {
    let logger = MemoryLogger::new();
    logger.log("loss", 0.9);
    logger.log("loss", 0.4);
    logger.log_list("curve", &[0.1, 0.2]);
    logger.log_text("note", "done");
    logger.log_line("epoch 1");

    let metrics = logger.metrics();
    assert_eq!(
        metrics["loss"],
        vec![MetricValue::Number(0.9), MetricValue::Number(0.4)]
    );
    assert_eq!(latest(&metrics, "loss").and_then(MetricValue::as_f64), Some(0.4));
    assert_eq!(latest(&metrics, "curve").map(ToString::to_string), Some("[0.1, 0.2]".into()));
    assert!(latest(&metrics, "missing").is_none());
    assert_eq!(logger.lines(), vec!["epoch 1".to_string()]);
}

#[test]
fn metric_values_deserialize_untagged() {
    let values: Vec<MetricValue> = serde_json::from_str(r#"[0.5, 3, [1, 2.5], "ok"]"#).expect("json");
    assert_eq!(
        values,
        vec![
            MetricValue::Number(0.5),
            MetricValue::Number(3.0),
            MetricValue::List(vec![1.0, 2.5]),
            MetricValue::Text("ok".into()),
        ]
    );
}

#[test]
fn non_finite_metrics_persist_as_text() {
    let values: Vec<MetricValue> = vec![
        MetricValue::Number(f64::NAN).storable(),
        MetricValue::Number(f64::NEG_INFINITY).storable(),
        MetricValue::List(vec![0.5, f64::INFINITY]).storable(),
        MetricValue::Number(0.25).storable(),
    ];
    assert_eq!(
        values,
        vec![
            MetricValue::Text("NaN".into()),
            MetricValue::Text("-inf".into()),
            MetricValue::Text("[0.5, inf]".into()),
            MetricValue::Number(0.25),
        ]
    );
    let json = serde_json::to_string(&values).expect("json");
    let back: Vec<MetricValue> = serde_json::from_str(&json).expect("reload");
    assert_eq!(back, values);
}
