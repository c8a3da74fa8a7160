//! Integration tests for the legacy and v2 REST dialects.

#[allow(dead_code)]
mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_v2_ready_with_ready_model() {
    let iris = IrisModel::new("iris");
    let env = TestGateway::start(vec![iris.handle()]).await;

    let response = env.get("/v2/health/ready").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!(true));

    let response = env.get("/v2/health/live").await;
    assert_eq!(response.json::<Value>().await.unwrap(), json!(true));

    env.stop().await;
}

#[tokio::test]
async fn test_v2_infer_reshapes_rows() {
    let iris = IrisModel::new("iris");
    let env = TestGateway::start(vec![iris.handle()]).await;

    let response = env.post_json("/v2/models/iris/infer", &iris_v2_body()).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "model_name": "iris",
            "id": "iris-1",
            "outputs": [{ "name": "predict", "shape": [2], "datatype": "INT64", "data": [1, 1] }]
        })
    );

    let received = iris.received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0],
        vec![json!([6.8, 2.8, 4.8, 1.4]), json!([6.0, 3.4, 4.5, 1.6])]
    );

    drop(received);
    env.stop().await;
}

#[tokio::test]
async fn test_v2_infer_assigns_request_id() {
    let iris = IrisModel::new("iris");
    let env = TestGateway::start(vec![iris.handle()]).await;

    let mut body = iris_v2_body();
    body.as_object_mut().unwrap().remove("id");
    let response: Value = env
        .post_json("/v2/models/iris/infer", &body)
        .await
        .json()
        .await
        .unwrap();

    let id = response["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);

    env.stop().await;
}

#[tokio::test]
async fn test_legacy_infer() {
    let iris = IrisModel::new("iris");
    let env = TestGateway::start(vec![iris.handle()]).await;

    let response = env
        .post_json(
            "/models/iris/infer",
            &json!({ "instances": [[6.8, 2.8, 4.8, 1.4], [6.0, 3.4, 4.5, 1.6]] }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "predictions": [1, 1] })
    );

    env.stop().await;
}

#[tokio::test]
async fn test_versioned_routes() {
    let v1 = IrisModel::versioned("iris", "1");
    let v2 = IrisModel::versioned("iris", "2");
    let env = TestGateway::start(vec![v1.handle(), v2.handle()]).await;

    let response = env.post_json("/v2/models/iris/versions/1/infer", &iris_v2_body()).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["model_version"], json!("1"));
    assert_eq!(v1.received.lock().len(), 1);
    assert!(v2.received.lock().is_empty());

    let response = env.get("/models/iris/versions/2").await;
    let metadata: Value = response.json().await.unwrap();
    assert_eq!(metadata["versions"], json!(["2"]));
    assert_eq!(metadata["platform"], json!("sklearn"));

    let response = env.get("/v2/models/iris/versions/9/ready").await;
    assert_eq!(response.status(), 404);

    env.stop().await;
}

#[tokio::test]
async fn test_server_metadata_and_listing() {
    let env = TestGateway::start(vec![
        IrisModel::new("iris").handle(),
        IrisModel::new("mnist").handle(),
    ])
    .await;

    let metadata: Value = env.get("/v2").await.json().await.unwrap();
    assert_eq!(metadata["name"], json!("infergate"));
    assert_eq!(metadata["extensions"], json!(["model_repository_extension"]));

    let legacy: Value = env.get("/").await.json().await.unwrap();
    assert_eq!(legacy, metadata);

    let models: Value = env.get("/models").await.json().await.unwrap();
    assert_eq!(models, json!({ "models": ["iris", "mnist"] }));

    let ready: Value = env.get("/models/mnist/ready").await.json().await.unwrap();
    assert_eq!(ready, json!(true));

    let metadata: Value = env.get("/v2/models/iris").await.json().await.unwrap();
    assert_eq!(metadata["inputs"][0]["datatype"], json!("FP32"));
    assert_eq!(metadata["inputs"][0]["shape"], json!([-1, 4]));

    env.stop().await;
}

#[tokio::test]
async fn test_readiness_follows_registry() {
    let iris = IrisModel::new("iris");
    let env = TestGateway::start(vec![iris.handle()]).await;

    let slow = IrisModel::unready("slow");
    env.gateway.register(slow.handle()).unwrap();

    let response = env.get("/health/ready").await;
    assert_eq!(response.status(), 503);
    assert_eq!(response.json::<Value>().await.unwrap(), json!(false));

    let response = env.post_raw("/v2/models/slow/unload", "").await;
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "name": "slow", "unload": true })
    );

    let response = env.get("/health/ready").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!(true));

    env.stop().await;
}

#[tokio::test]
async fn test_fault_mapping() {
    let env = TestGateway::start(vec![
        IrisModel::new("iris").handle(),
        infergate::ModelHandle::sync(FaultyModel),
    ])
    .await;

    // Unknown route
    let response = env.get("/v3/models").await;
    assert_eq!(response.status(), 404);
    assert!(response.json::<Value>().await.unwrap()["error"].is_string());

    // Known route, wrong method
    let response = env.get("/v2/models/iris/infer").await;
    assert_eq!(response.status(), 405);

    // Unknown model
    let response = env.post_json("/v2/models/ghost/infer", &iris_v2_body()).await;
    assert_eq!(response.status(), 404);

    // Malformed bodies
    let response = env.post_raw("/v2/models/iris/infer", "{not json").await;
    assert_eq!(response.status(), 400);
    let response = env.post_raw("/models/iris/infer", r#"{"rows": []}"#).await;
    assert_eq!(response.status(), 400);

    // Shape disagrees with data
    let response = env
        .post_json(
            "/v2/models/iris/infer",
            &json!({
                "inputs": [{ "name": "x", "shape": [3], "datatype": "FP32", "data": [1.0, 2.0] }]
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Unknown datatype
    let response = env
        .post_json(
            "/v2/models/iris/infer",
            &json!({
                "inputs": [{ "name": "x", "shape": [1], "datatype": "COMPLEX64", "data": [1.0] }]
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Model fault
    let response = env.post_json("/models/faulty/infer", &json!({ "instances": [[1]] })).await;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("division by zero"));

    // The listener is still serving
    let response = env.get("/v2/health/live").await;
    assert_eq!(response.status(), 200);

    env.stop().await;
}

#[tokio::test]
async fn test_explain() {
    let tagged = TaggedModel::new("tagged", "a", Duration::from_millis(1));
    let env = TestGateway::start(vec![IrisModel::new("iris").handle(), tagged.handle()]).await;

    let response = env
        .post_json("/models/iris/explain", &json!({ "instances": [[1, 2, 3, 4]] }))
        .await;
    assert_eq!(response.status(), 501);

    let response = env
        .post_json("/models/tagged/explain", &json!({ "instances": [[1]] }))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "explanations": ["because"] })
    );

    let response = env
        .post_json(
            "/v2/models/tagged/explain",
            &json!({ "inputs": [{ "name": "x", "shape": [], "datatype": "INT32", "data": [1] }] }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outputs"][0]["name"], json!("explanation"));

    env.stop().await;
}

#[tokio::test]
async fn test_requested_outputs_filter() {
    let env = TestGateway::start(vec![IrisModel::new("iris").handle()]).await;

    let mut body = iris_v2_body();
    body["outputs"] = json!([{ "name": "proba" }]);
    let response: Value = env
        .post_json("/v2/models/iris/infer", &body)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(response["outputs"], json!([]));

    env.stop().await;
}

#[tokio::test]
async fn test_body_limit() {
    let mut config = infergate::config::GatewayConfig::development();
    config.http.max_body_size = 64;
    let env = TestGateway::start_with(config, None, vec![IrisModel::new("iris").handle()]).await;

    let rows: Vec<Value> = (0..64).map(|_| json!([1.0, 2.0, 3.0, 4.0])).collect();
    let response = env
        .post_json("/models/iris/infer", &json!({ "instances": rows }))
        .await;
    assert_eq!(response.status(), 413);

    env.stop().await;
}

#[tokio::test]
async fn test_disabled_rpc_listener() {
    let mut config = infergate::config::GatewayConfig::development();
    config.grpc.enabled = false;
    let env = TestGateway::start_with(config, None, Vec::new()).await;

    assert!(env.addrs.grpc.is_none());
    assert_eq!(env.get("/v2/health/live").await.status(), 200);

    let plane = Arc::clone(env.gateway.data_plane());
    assert!(plane.list().is_empty());

    env.stop().await;
}
