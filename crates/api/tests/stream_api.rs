//! Integration tests for the MJPEG wire protocol.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::*;
use gatewatch_pipeline::{JobPhase, ScriptedDetector};
use http_body_util::BodyExt;
use serde_json::json;

/// Pull bytes off a streaming body until `want` bytes are buffered or the
/// body ends.
async fn read_at_least(body: &mut axum::body::Body, buffer: &mut Vec<u8>, want: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while buffer.len() < want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out with {} of {want} bytes",
            buffer.len()
        );
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .expect("body stalled");
        match frame {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    buffer.extend_from_slice(&data);
                }
            }
            Some(Err(e)) => panic!("body error: {e}"),
            None => return,
        }
    }
}

#[tokio::test]
async fn first_part_is_framed_exactly() {
    // A detector that always sees one box keeps annotated frames flowing.
    let t = build_test_app_with(
        ScriptedDetector::moving_box(&[(40, 50); 256], 20, 0.9, 0),
        1000,
        |_| {},
    )
    .await;

    let response = post_json(
        t.app.clone(),
        "/jobs/rtsp",
        json!({"camera_id": "cam-1", "rtsp_url": "rtsp://example/1"}),
    )
    .await;
    let job_id = body_json(response).await["job_id"].as_str().unwrap().to_string();
    wait_for_phase(&t.manager, &job_id, JobPhase::Running).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = get(t.app.clone(), &format!("/stream/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Content-Type advertises the per-response boundary.
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let boundary = content_type
        .strip_prefix("multipart/x-mixed-replace; boundary=")
        .expect("unexpected content type")
        .to_string();
    assert!(boundary.len() >= 16, "boundary too short: {boundary}");
    assert!(boundary.is_ascii());

    // First part: headers, CRLF-framed, Content-Length matching the payload.
    let mut body = response.into_body();
    let mut buffer = Vec::new();
    read_at_least(&mut body, &mut buffer, 128).await;

    let head = format!("--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: ");
    assert!(
        buffer.starts_with(head.as_bytes()),
        "part head mismatch: {:?}",
        String::from_utf8_lossy(&buffer[..head.len().min(buffer.len())])
    );

    let rest = &buffer[head.len()..];
    let break_at = rest
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator not found");
    let content_length: usize = std::str::from_utf8(&rest[..break_at])
        .unwrap()
        .parse()
        .expect("unparseable Content-Length");

    let payload_start = head.len() + break_at + 4;
    read_at_least(&mut body, &mut buffer, payload_start + content_length + 2).await;

    let payload = &buffer[payload_start..payload_start + content_length];
    assert_eq!(&payload[..2], &[0xFF, 0xD8], "payload is not a JPEG");
    assert_eq!(
        &buffer[payload_start + content_length..payload_start + content_length + 2],
        b"\r\n",
        "part not CRLF-terminated"
    );

    // Dropping the subscriber must not disturb the job.
    drop(body);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.manager.status(&job_id).unwrap().phase, JobPhase::Running);
}

#[tokio::test]
async fn stream_for_unknown_job_is_404() {
    let t = build_test_app().await;
    let response = get(t.app.clone(), "/stream/no-such-job").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stream_after_terminal_ends_with_zero_parts() {
    let t = build_test_app().await;

    let request = multipart_upload("/jobs/video", "clip.mp4", b"fake");
    let response = tower::ServiceExt::oneshot(t.app.clone(), request).await.unwrap();
    let job_id = body_json(response).await["job_id"].as_str().unwrap().to_string();
    wait_for_phase(&t.manager, &job_id, JobPhase::Completed).await;

    let response = get(t.app.clone(), &format!("/stream/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The body must end promptly without delivering any part.
    let collected = tokio::time::timeout(Duration::from_secs(2), response.into_body().collect())
        .await
        .expect("stream did not end")
        .unwrap();
    assert!(collected.to_bytes().is_empty());
}
