//! Firestore tests against a real project or the emulator.
//!
//! Run with `GCP_PROJECT_ID` set (and `FIRESTORE_EMULATOR_HOST` for the
//! emulator) and `--ignored`.

use chrono::Utc;

use annai_firestore::{FirestoreClient, McqRepository, McqStore, UpdateOutcome, VideoRepository, VideoStore};
use annai_models::{McqContent, McqDraft, NewMcq, NewVideo, Principal};

fn draft(question: &str) -> McqDraft {
    McqDraft {
        question: question.to_string(),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        answer: "a".into(),
    }
}

#[tokio::test]
#[ignore = "requires Firestore credentials or emulator"]
async fn test_firestore_connection() {
    dotenvy::dotenv().ok();

    let client = FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");

    VideoRepository::new(client)
        .ping()
        .await
        .expect("Firestore should be reachable");
}

#[tokio::test]
#[ignore = "requires Firestore credentials or emulator"]
async fn test_video_and_question_round_trip() {
    dotenvy::dotenv().ok();

    let client = FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");
    let videos = VideoRepository::new(client.clone());
    let mcqs = McqRepository::new(client);

    let video = videos
        .insert_video(NewVideo {
            owner: Some(Principal::new("integration-user", None)),
            filename: "integration.mp4".into(),
            original_filename: "integration.mp4".into(),
            storage_key: "integration.mp4".into(),
            uploaded_at: Utc::now(),
            full_transcript: "one two three".into(),
            segments: vec!["one two".into(), "three".into()],
        })
        .await
        .expect("Failed to create video");
    println!("Created video: {}", video.id);

    let fetched = videos.get_video(&video.id).await.unwrap().expect("video exists");
    assert_eq!(fetched.segments, video.segments);

    let inserted = mcqs
        .insert_mcqs(
            &video.id,
            Some("integration-user"),
            vec![NewMcq::new(0, draft("first")), NewMcq::new(1, draft("second"))],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let listed = mcqs.list_mcqs(&video.id).await.unwrap();
    let questions: Vec<&str> = listed.iter().map(|m| m.question.as_str()).collect();
    assert_eq!(questions, vec!["first", "second"]);

    let edit = McqContent {
        question: "edited".into(),
        options: vec!["w".into(), "x".into(), "y".into(), "z".into()],
        answer: "z".into(),
    };
    let outcome = mcqs.replace_mcq_content(&listed[0].id, edit.clone()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);
    let outcome = mcqs.replace_mcq_content(&listed[0].id, edit).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged);
}
