use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::UploadConfig,
    database::{EventRepository, PhotoRepository, UserRepository},
    errors::{AppError, Result},
    models::{Actor, Event, EventRef, NewPhoto, Photo, PhotoUrls, Requester},
    services::{
        dual_writer::{ArtifactMeta, DualDestinationWriter, StoredArtifacts},
        event_reclaimer::EventReclaimer,
        metrics::MetricsService,
        quota_ledger::QuotaLedger,
    },
    storage::Variant,
    utils::{
        crypto::{calculate_sha256, verify_event_password},
        file::{display_file_name, inspect_image},
        Clock,
    },
};

/// Entry point for photo uploads, listing and deletion on events.
pub struct PhotoService {
    events: Arc<dyn EventRepository>,
    photos: Arc<dyn PhotoRepository>,
    ledger: QuotaLedger,
    reclaimer: EventReclaimer,
    writer: DualDestinationWriter,
    clock: Arc<dyn Clock>,
    limits: UploadConfig,
    metrics: MetricsService,
}

impl PhotoService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        photos: Arc<dyn PhotoRepository>,
        writer: DualDestinationWriter,
        clock: Arc<dyn Clock>,
        limits: UploadConfig,
    ) -> Self {
        Self {
            ledger: QuotaLedger::new(users.clone(), events.clone()),
            reclaimer: EventReclaimer::new(
                events.clone(),
                users,
                photos.clone(),
                writer.clone(),
            ),
            events,
            photos,
            writer,
            clock,
            limits,
            metrics: MetricsService::new(),
        }
    }

    /// Stores one image in both destinations, records it, then charges quota.
    ///
    /// Quota is only charged once the photo row exists. A failure after the
    /// dual write removes both artifacts before returning.
    #[instrument(skip_all, fields(event = %event_ref, actor = %actor))]
    pub async fn upload_photo<R>(
        &self,
        event_ref: &EventRef,
        actor: Actor,
        content: R,
        declared_file_name: &str,
    ) -> Result<Photo>
    where
        R: AsyncRead + Send + Unpin,
    {
        let result = self
            .store_photo(event_ref, actor, content, declared_file_name)
            .await;

        match &result {
            Ok(photo) => self.metrics.record_upload(photo.file_size as u64),
            Err(e) => {
                tracing::info!(reason = e.kind(), error = %e, "Upload rejected");
                self.metrics.record_upload_failure(e.kind());
            }
        }

        result
    }

    async fn store_photo<R>(
        &self,
        event_ref: &EventRef,
        actor: Actor,
        content: R,
        declared_file_name: &str,
    ) -> Result<Photo>
    where
        R: AsyncRead + Send + Unpin,
    {
        let event = self.resolve_event(event_ref).await?;
        let now = self.clock.now();
        if event.is_expired_at(now) {
            return Err(AppError::Authorization("Event has expired".to_string()));
        }

        authorize_upload(&event, event_ref, actor)?;
        self.ledger.precheck_upload(&event, actor).await?;

        let data = read_bounded(content, self.limits.max_file_size).await?;
        let inspected = inspect_image(
            &data,
            &self.limits.allowed_mime_types,
            self.limits.max_image_dimension,
        )?;
        let file_name = display_file_name(declared_file_name);

        let meta = ArtifactMeta {
            event_id: event.id,
            file_name: file_name.clone(),
            mime_type: inspected.mime_type.clone(),
            extension: inspected.extension,
        };
        let stored = self.writer.write(data.clone(), &meta).await?;

        let new_photo = NewPhoto {
            event_id: event.id,
            user_id: actor.user_id(),
            file_name,
            file_size: data.len() as i64,
            mime_type: inspected.mime_type,
            content_key: stored.content_key.clone(),
            rendition_id: stored.rendition_id.clone(),
            sha256: calculate_sha256(&data),
            is_guest: actor.is_guest(),
            created_at: now,
        };

        let photo = match self.photos.create(&new_photo).await {
            Ok(photo) => photo,
            Err(e) => {
                tracing::error!(
                    content_key = %stored.content_key,
                    rendition_id = %stored.rendition_id,
                    error = %e,
                    "Photo record insert failed, removing stored artifacts"
                );
                self.writer.compensate(&stored).await;
                return Err(AppError::Persistence(Box::new(e)));
            }
        };

        self.ledger.commit_upload(&event, actor).await;

        tracing::info!(
            photo_id = %photo.id,
            event_id = %event.id,
            size_bytes = photo.file_size,
            mime_type = %photo.mime_type,
            "Photo uploaded"
        );

        Ok(photo)
    }

    /// Photos of an event, newest first.
    #[instrument(skip_all, fields(event = %event_ref, actor = %requester.actor))]
    pub async fn list_event_photos(
        &self,
        event_ref: &EventRef,
        requester: &Requester,
    ) -> Result<Vec<Photo>> {
        let event = self.resolve_event(event_ref).await?;
        authorize_view(&event, requester, self.clock.now())?;

        self.photos.get_by_event_id(event.id).await
    }

    /// Removes a photo and both of its artifacts. Only the uploader or the
    /// event owner may do this. Allowances are left as they are.
    ///
    /// If either artifact cannot be removed the record is kept, so the call
    /// can simply be repeated.
    #[instrument(skip_all, fields(photo_id = %photo_id, actor = %actor))]
    pub async fn delete_photo(&self, photo_id: Uuid, actor: Actor) -> Result<()> {
        let photo = self
            .photos
            .get_by_id(photo_id)
            .await?
            .ok_or(AppError::NotFound("photo"))?;

        let user_id = actor.user_id().ok_or_else(|| {
            AppError::Authorization("Guests cannot delete photos".to_string())
        })?;

        if photo.user_id != Some(user_id) {
            let event = self
                .events
                .get_by_id(photo.event_id)
                .await?
                .ok_or(AppError::NotFound("event"))?;
            if !event.is_owned_by(user_id) {
                return Err(AppError::Authorization(
                    "Only the uploader or the event owner can delete this photo".to_string(),
                ));
            }
        }

        let report = self.writer.remove(&artifacts_of(&photo)).await;
        if !report.is_clean() {
            tracing::warn!(
                photo_id = %photo.id,
                failures = report.failures(),
                "Artifact removal failed, keeping photo record"
            );
        }
        report.into_result()?;

        self.photos.delete(photo.id).await?;

        tracing::info!(photo_id = %photo.id, event_id = %photo.event_id, "Photo deleted");
        Ok(())
    }

    /// Number of photos stored on an event, under the same visibility rules
    /// as listing.
    pub async fn event_photo_count(
        &self,
        event_ref: &EventRef,
        requester: &Requester,
    ) -> Result<i64> {
        let event = self.resolve_event(event_ref).await?;
        authorize_view(&event, requester, self.clock.now())?;

        self.photos.count_by_event_id(event.id).await
    }

    /// Deletes an event with all of its photos and artifacts on the owner's
    /// request. The owner gets the event allowance back; photo allowance is
    /// not refunded.
    #[instrument(skip_all, fields(event_id = %event_id, actor = %actor))]
    pub async fn delete_event(&self, event_id: Uuid, actor: Actor) -> Result<()> {
        let event = self
            .events
            .get_by_id(event_id)
            .await?
            .ok_or(AppError::NotFound("event"))?;

        if !actor.user_id().is_some_and(|id| event.is_owned_by(id)) {
            return Err(AppError::Authorization(
                "Only the event owner can delete this event".to_string(),
            ));
        }

        let outcome = self.reclaimer.reclaim(&event).await.map_err(|(stage, e)| {
            tracing::error!(stage = %stage, error = %e, "Event deletion failed");
            e
        })?;

        if outcome.artifact_failures > 0 {
            tracing::warn!(
                failures = outcome.artifact_failures,
                "Some artifacts of the deleted event were left behind"
            );
        }

        Ok(())
    }

    pub fn photo_urls(&self, photo: &Photo) -> PhotoUrls {
        PhotoUrls {
            public: self.derived_url(photo, Variant::Public),
            thumbnail: self.derived_url(photo, Variant::Thumbnail),
            medium: self.derived_url(photo, Variant::Medium),
        }
    }

    pub fn derived_url(&self, photo: &Photo, variant: Variant) -> String {
        self.writer.derived_url(&photo.rendition_id, variant)
    }

    async fn resolve_event(&self, event_ref: &EventRef) -> Result<Event> {
        let event = match event_ref {
            EventRef::Id(id) => self.events.get_by_id(*id).await?,
            EventRef::Url(url) => self.events.get_by_url(url).await?,
        };

        event.ok_or(AppError::NotFound("event"))
    }
}

pub(crate) fn artifacts_of(photo: &Photo) -> StoredArtifacts {
    StoredArtifacts {
        content_key: photo.content_key.clone(),
        rendition_id: photo.rendition_id.clone(),
    }
}

fn authorize_upload(event: &Event, event_ref: &EventRef, actor: Actor) -> Result<()> {
    if actor.user_id().is_some_and(|id| event.is_owned_by(id)) {
        return Ok(());
    }

    if !event.allow_guest_uploads {
        return Err(AppError::Authorization(
            "Event does not accept guest uploads".to_string(),
        ));
    }

    if actor.is_guest() && event_ref.is_public_gallery() && !event.is_public {
        return Err(AppError::Authorization("Event gallery is not public".to_string()));
    }

    Ok(())
}

fn authorize_view(event: &Event, requester: &Requester, now: DateTime<Utc>) -> Result<()> {
    if requester
        .actor
        .user_id()
        .is_some_and(|id| event.is_owned_by(id))
    {
        return Ok(());
    }

    if !event.is_public {
        return Err(AppError::Authorization("Event is private".to_string()));
    }

    if event.is_expired_at(now) {
        return Err(AppError::Authorization("Event has expired".to_string()));
    }

    if let Some(hash) = event.password_hash.as_deref().filter(|_| event.has_password()) {
        let presented = requester.event_password.as_deref().ok_or_else(|| {
            AppError::Authorization("Event password required".to_string())
        })?;
        if !verify_event_password(presented, hash) {
            return Err(AppError::Authorization("Incorrect event password".to_string()));
        }
    }

    Ok(())
}

/// Buffers the whole stream once. Both destinations and the MIME sniffer read
/// from this one buffer.
async fn read_bounded<R>(content: R, max_size: usize) -> Result<Bytes>
where
    R: AsyncRead + Send + Unpin,
{
    let mut buffer = Vec::new();
    content
        .take(max_size as u64 + 1)
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;

    if buffer.len() > max_size {
        return Err(AppError::Validation(format!(
            "File exceeds the maximum size of {} bytes",
            max_size
        )));
    }

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::models::User;
    use crate::storage::memory::{MemoryContentStore, MemoryRenditionStore};
    use crate::utils::{KeyGenerator, ManualClock};
    use chrono::{Duration, Utc};
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    struct Harness {
        db: Arc<MemoryDatabase>,
        content: Arc<MemoryContentStore>,
        clock: Arc<ManualClock>,
        service: PhotoService,
    }

    fn harness(max_file_size: usize) -> Harness {
        let db = Arc::new(MemoryDatabase::new());
        let content = Arc::new(MemoryContentStore::new());
        let renditions = Arc::new(MemoryRenditionStore::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let writer = DualDestinationWriter::new(
            content.clone(),
            renditions,
            clock.clone(),
            Arc::new(KeyGenerator::seeded(3)),
            std::time::Duration::from_secs(5),
        );
        let limits = UploadConfig {
            max_file_size,
            allowed_mime_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
            max_image_dimension: 1_000,
            write_timeout_secs: 5,
        };
        let service = PhotoService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            writer,
            clock.clone(),
            limits,
        );
        Harness {
            db,
            content,
            clock,
            service,
        }
    }

    fn seed(db: &MemoryDatabase, configure: impl FnOnce(&mut Event)) -> (User, Event) {
        let now = Utc::now();
        let owner = User {
            id: Uuid::new_v4(),
            full_name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
            photo_allowance: 5,
            event_allowance: 1,
            created_at: now,
            updated_at: now,
        };
        let mut event = Event {
            id: Uuid::new_v4(),
            user_id: owner.id,
            title: "Reunion".to_string(),
            url: "reunion".to_string(),
            is_public: true,
            allow_guest_uploads: true,
            password_hash: None,
            photo_limit: None,
            photo_count: 0,
            expires_at: now + Duration::days(3),
            created_at: now,
            updated_at: now,
        };
        configure(&mut event);
        db.insert_user(owner.clone());
        db.insert_event(event.clone());
        (owner, event)
    }

    fn png() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(2, 2);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_guest_rejected_when_guest_uploads_disabled() {
        let h = harness(1 << 20);
        let (_, event) = seed(&h.db, |e| e.allow_guest_uploads = false);

        let err = h
            .service
            .upload_photo(&EventRef::Id(event.id), Actor::Guest, &png()[..], "a.png")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Authorization(_)));
        assert!(h.content.is_empty());
    }

    #[tokio::test]
    async fn test_closed_event_accepts_only_the_owner() {
        let h = harness(1 << 20);
        let (owner, event) = seed(&h.db, |e| {
            e.allow_guest_uploads = false;
            e.is_public = false;
        });
        let stranger = Uuid::new_v4();

        let err = h
            .service
            .upload_photo(&EventRef::Id(event.id), Actor::User(stranger), &png()[..], "a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert!(h.content.is_empty());
        assert!(h.db.photos().is_empty());

        let photo = h
            .service
            .upload_photo(
                &EventRef::Url(event.url.clone()),
                Actor::User(owner.id),
                &png()[..],
                "a.png",
            )
            .await
            .unwrap();
        assert_eq!(photo.user_id, Some(owner.id));
        assert_eq!(h.content.len(), 1);
    }

    #[tokio::test]
    async fn test_private_gallery_rejects_guest_by_url_only() {
        let h = harness(1 << 20);
        let (_, event) = seed(&h.db, |e| e.is_public = false);

        let by_url = h
            .service
            .upload_photo(&EventRef::Url(event.url.clone()), Actor::Guest, &png()[..], "a.png")
            .await;
        assert!(matches!(by_url, Err(AppError::Authorization(_))));

        let by_id = h
            .service
            .upload_photo(&EventRef::Id(event.id), Actor::Guest, &png()[..], "a.png")
            .await;
        assert!(by_id.is_ok());
    }

    #[tokio::test]
    async fn test_expired_event_rejects_uploads() {
        let h = harness(1 << 20);
        let (owner, event) = seed(&h.db, |_| {});
        h.clock.set(event.expires_at + Duration::seconds(1));

        let err = h
            .service
            .upload_photo(&EventRef::Id(event.id), Actor::User(owner.id), &png()[..], "a.png")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let h = harness(1 << 20);

        let err = h
            .service
            .upload_photo(&EventRef::Url("nope".into()), Actor::Guest, &png()[..], "a.png")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound("event")));
    }

    #[tokio::test]
    async fn test_oversize_payload_is_rejected_before_writing() {
        let h = harness(16);
        let (owner, event) = seed(&h.db, |_| {});

        let err = h
            .service
            .upload_photo(&EventRef::Id(event.id), Actor::User(owner.id), &png()[..], "a.png")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.content.is_empty());
        assert_eq!(h.db.user(owner.id).unwrap().photo_allowance, 5);
    }

    #[tokio::test]
    async fn test_mime_comes_from_bytes_not_file_name() {
        let h = harness(1 << 20);
        let (owner, event) = seed(&h.db, |_| {});

        let photo = h
            .service
            .upload_photo(
                &EventRef::Id(event.id),
                Actor::User(owner.id),
                &png()[..],
                "holiday/../snapshot.jpg",
            )
            .await
            .unwrap();

        assert_eq!(photo.mime_type, "image/png");
        assert_eq!(photo.file_name, "snapshot.jpg");
        assert!(photo.content_key.ends_with(".png"));
        assert_eq!(photo.sha256, calculate_sha256(&png()));
    }

    #[tokio::test]
    async fn test_text_disguised_as_image_is_rejected() {
        let h = harness(1 << 20);
        let (owner, event) = seed(&h.db, |_| {});

        let err = h
            .service
            .upload_photo(
                &EventRef::Id(event.id),
                Actor::User(owner.id),
                &b"definitely not an image"[..],
                "photo.jpg",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_listing_rules_for_non_owners() {
        let h = harness(1 << 20);
        let hash = bcrypt::hash("secret", 4).unwrap();
        let (owner, event) = seed(&h.db, |e| e.password_hash = Some(hash));
        let guest = Requester::new(Actor::Guest);
        let event_ref = EventRef::Url(event.url.clone());

        let missing = h.service.list_event_photos(&event_ref, &guest).await;
        assert!(matches!(missing, Err(AppError::Authorization(_))));

        let wrong = h
            .service
            .list_event_photos(&event_ref, &guest.clone().with_password("guess"))
            .await;
        assert!(matches!(wrong, Err(AppError::Authorization(_))));

        let ok = h
            .service
            .list_event_photos(&event_ref, &guest.clone().with_password("secret"))
            .await;
        assert!(ok.unwrap().is_empty());

        h.clock.advance(Duration::days(4));
        let expired = h
            .service
            .list_event_photos(&event_ref, &guest.with_password("secret"))
            .await;
        assert!(matches!(expired, Err(AppError::Authorization(_))));

        let owner_view = h
            .service
            .list_event_photos(&event_ref, &Requester::new(Actor::User(owner.id)))
            .await;
        assert!(owner_view.is_ok());
    }

    #[tokio::test]
    async fn test_only_owner_may_delete_event() {
        let h = harness(1 << 20);
        let (owner, event) = seed(&h.db, |_| {});

        for actor in [Actor::Guest, Actor::User(Uuid::new_v4())] {
            let err = h.service.delete_event(event.id, actor).await.unwrap_err();
            assert!(matches!(err, AppError::Authorization(_)));
        }
        assert!(h.db.event(event.id).is_some());

        let missing = h.service.delete_event(Uuid::new_v4(), Actor::User(owner.id)).await;
        assert!(matches!(missing, Err(AppError::NotFound("event"))));
    }

    #[tokio::test]
    async fn test_private_event_listing_is_owner_only() {
        let h = harness(1 << 20);
        let (_, event) = seed(&h.db, |e| e.is_public = false);

        let result = h
            .service
            .list_event_photos(
                &EventRef::Id(event.id),
                &Requester::new(Actor::User(Uuid::new_v4())),
            )
            .await;

        assert!(matches!(result, Err(AppError::Authorization(_))));
    }
}
