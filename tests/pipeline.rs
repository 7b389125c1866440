// 该文件是 Jianwen （见闻） 项目的一部分。
// tests/pipeline.rs - 检测与问答流程测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod common;

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use assert_matches::assert_matches;

use jianwen::{
  answer::{AnswererError, Orchestrator, OrchestratorConfig, QaError},
  context::{ContextBuilder, ContextPolicy},
  model::{BoundingBox, DetectionRecord, DetectorError},
  normalize::Normalizer,
  session::SessionStore,
  task::{AskTask, ContextOrder, DetectTask, DetectTaskError},
};

use common::{StubAnswerer, StubDetector, png_bytes, raw};

fn ask_task(answerer: Arc<StubAnswerer>) -> AskTask<Arc<StubAnswerer>> {
  AskTask::new(
    ContextBuilder::default(),
    Orchestrator::new(answerer, OrchestratorConfig::default()),
  )
}

fn record(class_name: &str, confidence: f32, bbox: [f32; 4]) -> DetectionRecord {
  let [x1, y1, x2, y2] = bbox;
  DetectionRecord::new(class_name, confidence, BoundingBox::new(x1, y1, x2, y2)).unwrap()
}

#[tokio::test]
async fn boxes_inside_image_pass_through_unchanged() {
  let objects = vec![
    raw(0, 0.92, [10.0, 10.0, 100.0, 200.0]),
    raw(16, 0.81, [50.0, 60.0, 150.0, 160.0]),
    raw(41, 0.40, [0.0, 0.0, 320.0, 240.0]),
  ];
  let task = DetectTask::new(StubDetector::returning(objects.clone()), Normalizer::default());
  let result = task.run(&png_bytes(320, 240)).await.unwrap();

  assert_eq!(result.detections().len(), objects.len());
  for (record, object) in result.detections().iter().zip(&objects) {
    assert_eq!(record.bounding_box().as_array(), object.bbox.map(|v| v as f32));
  }
  assert_eq!(result.detections()[0].class_name(), "person");
  assert_eq!(result.detections()[1].class_name(), "dog");
  assert_eq!(result.detections()[2].class_name(), "cup");
  assert_eq!(result.dropped().total(), 0);

  let annotated = image::load_from_memory(result.annotated_image()).unwrap();
  assert_eq!((annotated.width(), annotated.height()), (320, 240));
}

#[tokio::test(flavor = "current_thread")]
async fn image_work_yields_to_other_tasks() {
  let ran = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&ran);
  tokio::spawn(async move {
    flag.store(true, Ordering::SeqCst);
  });

  let task = DetectTask::new(
    StubDetector::returning(vec![raw(0, 0.9, [10.0, 10.0, 500.0, 400.0])]),
    Normalizer::default(),
  );
  task.run(&png_bytes(1024, 768)).await.unwrap();

  // 单线程运行时中，只有 run 让出执行权时其他任务才能运行
  assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn degenerate_box_is_dropped_without_failing() {
  let objects = vec![
    raw(0, 0.9, [10.0, 10.0, 50.0, 50.0]),
    raw(0, 0.8, [30.0, 10.0, 30.0, 50.0]),
  ];
  let task = DetectTask::new(StubDetector::returning(objects.clone()), Normalizer::default());
  let result = task.run(&png_bytes(64, 64)).await.unwrap();

  assert_eq!(result.detections().len(), objects.len() - 1);
  assert_eq!(result.dropped().degenerate_box, 1);
}

#[tokio::test]
async fn unknown_class_and_bad_score_are_counted() {
  let objects = vec![
    raw(0, 0.9, [1.0, 1.0, 10.0, 10.0]),
    raw(80, 0.9, [1.0, 1.0, 10.0, 10.0]),
    raw(-1, 0.9, [1.0, 1.0, 10.0, 10.0]),
    raw(1, 1.5, [1.0, 1.0, 10.0, 10.0]),
  ];
  let task = DetectTask::new(StubDetector::returning(objects), Normalizer::default());
  let result = task.run(&png_bytes(32, 32)).await.unwrap();

  assert_eq!(result.detections().len(), 1);
  assert_eq!(result.dropped().unknown_class, 2);
  assert_eq!(result.dropped().invalid_confidence, 1);
}

#[tokio::test]
async fn undecodable_image_never_reaches_detector() {
  let task = DetectTask::new(
    StubDetector::failing(DetectorError::Unavailable("should not be called".into())),
    Normalizer::default(),
  );
  let err = task.run(b"definitely not an image").await.unwrap_err();
  assert_matches!(err, DetectTaskError::Normalize(_));
}

#[tokio::test]
async fn detector_failure_is_not_an_empty_result() {
  let task = DetectTask::new(
    StubDetector::failing(DetectorError::Unavailable("connection refused".into())),
    Normalizer::default(),
  );
  let err = task.run(&png_bytes(8, 8)).await.unwrap_err();
  assert_matches!(err, DetectTaskError::Detector(DetectorError::Unavailable(_)));
}

#[tokio::test]
async fn prompt_enumerates_detections_and_answer_is_returned_verbatim() {
  let answerer = StubAnswerer::new(vec![Ok("2 objects: a person and a dog.".to_string())]);
  let task = ask_task(answerer.clone());
  let detections = vec![
    record("person", 0.92, [10.0, 10.0, 100.0, 200.0]),
    record("dog", 0.81, [50.0, 60.0, 150.0, 160.0]),
  ];

  let exchange = task
    .run("How many objects are detected?", &detections, ContextOrder::Input, &[])
    .await
    .unwrap();

  assert_eq!(exchange.answer, "2 objects: a person and a dog.");
  assert_eq!(exchange.question, "How many objects are detected?");

  let prompts = answerer.prompts();
  assert_eq!(prompts.len(), 1);
  assert!(prompts[0].contains("1. person (confidence: 0.920"));
  assert!(prompts[0].contains("2. dog (confidence: 0.810"));
  assert!(prompts[0].contains("User Question: How many objects are detected?"));
}

#[tokio::test]
async fn empty_question_makes_no_external_call() {
  let answerer = StubAnswerer::new(vec![]);
  let task = ask_task(answerer.clone());
  let detections = vec![record("cat", 0.7, [0.0, 0.0, 5.0, 5.0])];

  for question in ["", "   ", "\n\t"] {
    let err = task
      .run(question, &detections, ContextOrder::Input, &[])
      .await
      .unwrap_err();
    assert_matches!(err, QaError::InvalidQuestion(_));
  }
  assert_eq!(answerer.calls(), 0);
}

#[tokio::test]
async fn rate_limit_is_distinct_and_not_retried() {
  let answerer = StubAnswerer::new(vec![Err(AnswererError::RateLimited {
    retry_after: Some(std::time::Duration::from_secs(7)),
  })]);
  let task = ask_task(answerer.clone());
  let detections = vec![record("cat", 0.7, [0.0, 0.0, 5.0, 5.0])];

  let err = task
    .run("what is this?", &detections, ContextOrder::Input, &[])
    .await
    .unwrap_err();
  assert_matches!(err, QaError::RateLimited { retry_after: Some(after) } if after.as_secs() == 7);
  assert_eq!(answerer.calls(), 1);
}

#[tokio::test]
async fn second_detection_replaces_session_context() {
  let sessions = SessionStore::default();
  let detect_first = DetectTask::new(
    StubDetector::returning(vec![raw(15, 0.9, [1.0, 1.0, 20.0, 20.0])]),
    Normalizer::default(),
  );
  let detect_second = DetectTask::new(
    StubDetector::returning(vec![
      raw(2, 0.8, [5.0, 5.0, 40.0, 30.0]),
      raw(9, 0.6, [10.0, 2.0, 14.0, 12.0]),
    ]),
    Normalizer::default(),
  );
  let answerer = StubAnswerer::new(vec![
    Ok("A cat.".to_string()),
    Ok("A car and a traffic light.".to_string()),
  ]);
  let ask = ask_task(answerer.clone());
  let image = png_bytes(64, 64);

  let first = detect_first.run(&image).await.unwrap();
  let generation = sessions.begin_detection("alice", first.detections().to_vec());
  let snapshot = sessions.snapshot("alice").unwrap();
  let exchange = ask
    .run("what objects do you see", &snapshot.detections, ContextOrder::Input, &snapshot.history)
    .await
    .unwrap();
  assert!(sessions.record_exchange("alice", generation, exchange));

  let second = detect_second.run(&image).await.unwrap();
  sessions.begin_detection("alice", second.detections().to_vec());
  let snapshot = sessions.snapshot("alice").unwrap();
  assert!(snapshot.history.is_empty());
  ask
    .run("what objects do you see", &snapshot.detections, ContextOrder::Input, &snapshot.history)
    .await
    .unwrap();

  let prompts = answerer.prompts();
  assert!(prompts[0].contains("1. cat (confidence"));
  assert!(!prompts[1].contains("cat (confidence"));
  assert!(!prompts[1].contains("- cat:"));
  assert!(!prompts[1].contains("A cat."));
  assert!(prompts[1].contains("car"));
  assert!(prompts[1].contains("traffic light"));
}

#[tokio::test]
async fn exchange_for_stale_generation_is_discarded() {
  let sessions = SessionStore::default();
  let stale = sessions.begin_detection("bob", vec![record("cat", 0.9, [0.0, 0.0, 4.0, 4.0])]);
  sessions.begin_detection("bob", vec![record("dog", 0.9, [0.0, 0.0, 4.0, 4.0])]);

  let answerer = StubAnswerer::new(vec![Ok("A cat.".to_string())]);
  let exchange = ask_task(answerer)
    .run("what is it?", &[record("cat", 0.9, [0.0, 0.0, 4.0, 4.0])], ContextOrder::Input, &[])
    .await
    .unwrap();

  assert!(!sessions.record_exchange("bob", stale, exchange));
  assert!(sessions.snapshot("bob").unwrap().history.is_empty());
}

#[tokio::test]
async fn large_detection_sets_are_truncated_in_prompt() {
  let answerer = StubAnswerer::new(vec![]);
  let ask = AskTask::new(
    ContextBuilder::new(ContextPolicy::default()),
    Orchestrator::new(answerer.clone(), OrchestratorConfig::default()),
  );
  let detections: Vec<_> = (0..230)
    .map(|i| record("person", 0.5 + (i % 10) as f32 / 100.0, [0.0, 0.0, 10.0, 10.0]))
    .collect();

  ask
    .run("how many people?", &detections, ContextOrder::Confidence, &[])
    .await
    .unwrap();

  let prompt = &answerer.prompts()[0];
  assert!(prompt.contains("Total objects detected: 230"));
  assert!(prompt.contains("- person: 230"));
  assert!(prompt.contains("30 additional detections omitted"));
}
