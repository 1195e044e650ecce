mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn describes_user_model() -> Result<()> {
    let app = common::spawn_app();
    let (status, body) = app.get("/api/v1/model?modelName=User", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tableFields"], json!(["name", "email", "role"]));
    assert_eq!(body["singleInstanceState"], false);
    assert_eq!(body["viewOnly"], false);

    let metadata = &body["metadata"];
    let keys: Vec<&str> = metadata.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["name", "email", "password", "role"]);
    assert_eq!(metadata["email"]["componentType"], "Email");
    assert_eq!(metadata["name"]["componentType"], "TextField");
    assert_eq!(metadata["name"]["required"], true);
    assert_eq!(metadata["name"]["isArray"], false);
    assert_eq!(metadata["name"]["ref"], "");
    assert_eq!(metadata["role"]["enumValues"], json!(["user", "superadmin"]));
    assert!(metadata["role"].get("dependsOn").is_none());
    Ok(())
}

#[tokio::test]
async fn describes_contact_model_with_nested_seo() -> Result<()> {
    let app = common::spawn_app();
    let (status, body) = app.get("/api/v1/model?modelName=ContactUs", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["viewOnly"], true);
    assert_eq!(body["metadata"]["status"]["componentType"], "SelectEnumInputField");
    assert_eq!(body["metadata"]["seo"]["metaTitle"]["type"], "Text");
    assert_eq!(body["metadata"]["seo"]["metaTitle"]["required"], false);
    Ok(())
}

#[tokio::test]
async fn model_lookup_errors() -> Result<()> {
    let app = common::spawn_app();

    let (status, body) = app.get("/api/v1/model", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please provide a valid modelName parameter");

    let (status, body) = app.get("/api/v1/model?modelName=Invoice", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Model 'Invoice' not found");
    Ok(())
}
