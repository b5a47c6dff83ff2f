//! Service-level tests of generation, upload and the transformation flow

mod common;

use std::time::Duration;

use common::{
    connection_failure, dialogue, encoded_image, image_result, service, state_of, ScriptedGenerator,
};
use image::ImageFormat;
use imagine_bot::generation_errors::GenerationError;
use imagine_bot::service::TransformError;
use imagine_bot::transform::TransformState;

const USER: u64 = 4242;
const CHAT: i64 = 4242;

#[tokio::test]
async fn test_generation_increments_counter_and_records_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![Ok(image_result()), Ok(image_result())]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);

    let outcome = service.generate(USER, "a red fox").await.unwrap();
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.image, image_result());
    // Archival failure does not fail the generation
    assert!(outcome.saved.is_none());

    let outcome = service.generate(USER, "a blue whale").await.unwrap();
    assert_eq!(outcome.total, 2);

    let session = service.session(USER);
    assert_eq!(session.images_generated, 2);
    assert_eq!(session.images_transformed, 0);
    assert_eq!(session.last_prompt.as_deref(), Some("a blue whale"));
}

#[tokio::test]
async fn test_failed_generation_leaves_counters_alone() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![Err(GenerationError::ContentPolicyViolation(
        "rejected".to_string(),
    ))]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);

    let err = service.generate(USER, "something forbidden").await.unwrap_err();
    assert!(matches!(err, GenerationError::ContentPolicyViolation(_)));

    let session = service.session(USER);
    assert_eq!(session.images_generated, 0);
    assert_eq!(session.last_prompt, None);
}

#[tokio::test]
async fn test_upload_then_instruction_transforms_and_clears_pending() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![Ok(image_result())]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    let saved = service
        .register_upload(USER, &encoded_image(64, 48, ImageFormat::Jpeg), &dialogue)
        .await
        .unwrap();
    assert!(saved.path.exists());
    assert!(saved
        .path
        .starts_with(dir.path().join("uploaded_images").join(USER.to_string())));
    let file_name = saved.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("upload_") && file_name.ends_with(".jpg"));

    assert_eq!(
        state_of(&dialogue).await,
        TransformState::AwaitingInstruction {
            upload: saved.path.clone()
        }
    );
    assert_eq!(service.session(USER).images_uploaded, 1);

    let outcome = service.transform(USER, "shows it at night", &dialogue).await.unwrap();
    assert_eq!(outcome.total, 1);
    assert_eq!(state_of(&dialogue).await, TransformState::Idle);
    assert_eq!(
        generator.prompts(),
        vec!["An image that shows it at night, preserving the essence of the original".to_string()]
    );

    let session = service.session(USER);
    assert_eq!(session.images_transformed, 1);
    assert_eq!(session.images_generated, 0);

    // The upload persists, the prepared copy is gone
    assert!(saved.path.exists());
    let upload_dir = saved.path.parent().unwrap();
    assert_eq!(std::fs::read_dir(upload_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn test_failed_transformation_keeps_pending_upload() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![
        Err(connection_failure()),
        Err(connection_failure()),
        Err(connection_failure()),
        Ok(image_result()),
    ]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    let saved = service
        .register_upload(USER, &encoded_image(32, 32, ImageFormat::Png), &dialogue)
        .await
        .unwrap();

    let err = service.transform(USER, "make it snow", &dialogue).await.unwrap_err();
    assert!(matches!(
        err,
        TransformError::Generation(GenerationError::ConnectionFailed(_))
    ));
    assert_eq!(generator.calls(), 3);
    assert_eq!(
        state_of(&dialogue).await,
        TransformState::AwaitingInstruction {
            upload: saved.path.clone()
        }
    );
    assert_eq!(service.session(USER).images_transformed, 0);

    // A new instruction can retry against the same upload
    service.transform(USER, "make it rain", &dialogue).await.unwrap();
    assert_eq!(state_of(&dialogue).await, TransformState::Idle);
    assert_eq!(service.session(USER).images_transformed, 1);
}

#[tokio::test]
async fn test_transform_without_upload() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    let err = service.transform(USER, "anything", &dialogue).await.unwrap_err();
    assert!(matches!(err, TransformError::NoPendingUpload));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_upload_fails_preparation_without_calling_api() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![]);
    let service = service(generator.clone(), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    // Valid JPEG signature, truncated body
    let mut bytes = encoded_image(32, 32, ImageFormat::Jpeg);
    bytes.truncate(20);
    let saved = service.register_upload(USER, &bytes, &dialogue).await.unwrap();

    let err = service.transform(USER, "anything", &dialogue).await.unwrap_err();
    assert!(matches!(err, TransformError::Preparation(_)));
    assert_eq!(generator.calls(), 0);
    assert_eq!(
        state_of(&dialogue).await.pending_upload(),
        Some(saved.path.as_path())
    );
}

#[tokio::test]
async fn test_new_upload_replaces_pending_one() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(ScriptedGenerator::new(vec![]), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    let first = service
        .register_upload(USER, &encoded_image(16, 16, ImageFormat::Png), &dialogue)
        .await
        .unwrap();
    // Keep timestamps distinct
    std::thread::sleep(Duration::from_millis(5));
    let second = service
        .register_upload(USER, &encoded_image(16, 16, ImageFormat::Png), &dialogue)
        .await
        .unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(
        state_of(&dialogue).await.pending_upload(),
        Some(second.path.as_path())
    );
    assert_eq!(service.session(USER).images_uploaded, 2);
}

#[tokio::test]
async fn test_non_image_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(ScriptedGenerator::new(vec![]), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    assert!(service
        .register_upload(USER, b"this is not an image at all", &dialogue)
        .await
        .is_err());
    assert_eq!(state_of(&dialogue).await, TransformState::Idle);
    assert_eq!(service.session(USER).images_uploaded, 0);
}

#[tokio::test]
async fn test_clear_cancels_pending_upload() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(ScriptedGenerator::new(vec![]), dir.path(), Duration::ZERO);
    let dialogue = dialogue(CHAT);

    let saved = service
        .register_upload(USER, &encoded_image(16, 16, ImageFormat::Png), &dialogue)
        .await
        .unwrap();

    assert_eq!(service.clear(USER, &dialogue).await.unwrap(), 1);
    assert!(!saved.path.exists());
    assert_eq!(state_of(&dialogue).await, TransformState::Idle);
    assert_eq!(service.clear(USER, &dialogue).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cooldown_applies_per_user() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(ScriptedGenerator::new(vec![]), dir.path(), Duration::from_secs(10));

    assert!(service.admit(USER).allowed);
    let decision = service.admit(USER);
    assert!(!decision.allowed);
    assert!(decision.wait_seconds <= 10);
    assert!(service.admit(USER + 1).allowed);
    assert_eq!(service.cooldown_secs(), 10);
}

#[tokio::test]
async fn test_cooldown_rejection_keeps_pending_upload() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(vec![]);
    let service = service(generator.clone(), dir.path(), Duration::from_secs(10));
    let dialogue = dialogue(CHAT);

    assert!(service.admit(USER).allowed);
    service.generate(USER, "a quiet harbor").await.unwrap();

    // A captioned photo inside the cooldown window: stored, not transformed
    let saved = service
        .register_upload(USER, &encoded_image(16, 16, ImageFormat::Png), &dialogue)
        .await
        .unwrap();
    assert!(!service.admit(USER).allowed);

    assert_eq!(
        state_of(&dialogue).await,
        TransformState::AwaitingInstruction {
            upload: saved.path.clone()
        }
    );
    assert_eq!(generator.calls(), 1);
    assert_eq!(service.session(USER).images_transformed, 0);
}

#[tokio::test]
async fn test_transform_state_is_per_chat() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(ScriptedGenerator::new(vec![]), dir.path(), Duration::ZERO);
    let first = dialogue(1);
    let second = dialogue(2);

    service
        .register_upload(1, &encoded_image(16, 16, ImageFormat::Png), &first)
        .await
        .unwrap();

    assert!(state_of(&first).await.is_awaiting_instruction());
    assert_eq!(state_of(&second).await, TransformState::Idle);
    let err = service.transform(2, "anything", &second).await.unwrap_err();
    assert!(matches!(err, TransformError::NoPendingUpload));
}
