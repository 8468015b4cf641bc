use serde_json::Value;

#[test]
fn openapi_documents_every_route() -> anyhow::Result<()> {
    let doc = erp_gate::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    let expected = [
        ("/api/health", "get"),
        ("/auth/login", "post"),
        ("/auth/me", "get"),
        ("/auth/logout", "post"),
        ("/auth/permissions", "get"),
        ("/auth/team", "get"),
        ("/cloud/validate", "post"),
        ("/telemetry/metrics", "post"),
        ("/telemetry/patterns", "post"),
        ("/telemetry/actions", "post"),
        ("/security/dashboard", "get"),
        ("/security/events", "get"),
        ("/security/audit", "get"),
        ("/security/patterns", "get"),
    ];
    for (path, method) in expected {
        assert!(
            paths.get(path).and_then(|p| p.get(method)).is_some(),
            "OpenAPI missing {} {}",
            method,
            path
        );
    }

    assert_eq!(v["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
    assert_eq!(v["servers"][0]["url"], "http://localhost:8000");
    Ok(())
}

#[test]
fn user_schema_has_no_secret_fields() -> anyhow::Result<()> {
    let v = serde_json::to_value(erp_gate::docs::build_openapi(8000)?)?;
    let props = v["components"]["schemas"]["User"]["properties"]
        .as_object()
        .expect("components.schemas.User.properties must exist");

    for key in ["id", "email", "role", "is_active", "last_login"] {
        assert!(props.contains_key(key), "User schema missing '{}'", key);
    }
    assert!(!props.contains_key("password_hash"));
    Ok(())
}
