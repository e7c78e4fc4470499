use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::browser::{
    BrowserResult, CookieScope, DelayScheduler, LocateStrategy, MetricsHandle, PageDriver,
    Resolution, SelectorCandidate, SelectorResolver, SessionManager,
};
use crate::config::{
    DiagnosticsSection, PacingSection, RednoteConfig, SelectorSection, SiteSection, TimeoutSection,
};
use crate::extract::is_note_permalink;

use super::error::{PageElement, PublishFailure};
use super::models::{MediaAttachment, PublishOutcome, PublishParams, PublishRequest};
use super::phase::{PhaseResult, WorkflowPhase};

const AUTH_MESSAGE: &str =
    "not logged in or the stored session expired; log in again to refresh the cookie file";
const GENERIC_REJECTION: &str = "the platform reported an error without details";

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Result of probing the page after the publish click.
#[derive(Debug)]
enum Submission {
    Confirmed { url: Option<String> },
    Unconfirmed,
}

/// Drives the creator publish page from navigation to result classification.
#[derive(Debug, Clone)]
pub struct PublishOrchestrator {
    site: SiteSection,
    selectors: SelectorSection,
    timeouts: TimeoutSection,
    pacing: PacingSection,
    diagnostics: DiagnosticsSection,
    resolver: SelectorResolver,
    delays: DelayScheduler,
    metrics: MetricsHandle,
}

impl PublishOrchestrator {
    pub fn new(config: &RednoteConfig, delays: DelayScheduler, metrics: MetricsHandle) -> Self {
        Self {
            site: config.site.clone(),
            selectors: config.selectors.clone(),
            timeouts: config.timeouts.clone(),
            pacing: config.pacing.clone(),
            diagnostics: config.diagnostics.clone(),
            resolver: SelectorResolver::new(ms(config.timeouts.poll_interval_ms)),
            delays,
            metrics,
        }
    }

    /// Validates raw parameters, then publishes. Invalid input never opens a
    /// browser session.
    pub async fn publish_params(
        &self,
        sessions: &SessionManager,
        params: PublishParams,
    ) -> PublishOutcome {
        match PublishRequest::try_from(params) {
            Ok(request) => self.publish(sessions, request).await,
            Err(failure) => {
                warn!(error = %failure, "rejected publish request");
                self.metrics.with(|m| {
                    m.record_publish_attempt();
                    m.record_publish_failure();
                });
                PublishOutcome::failed(&failure, Vec::new())
            }
        }
    }

    /// Runs the workflow once. Expected failures come back as an outcome with
    /// `success == false`; the session is released on every path.
    pub async fn publish(&self, sessions: &SessionManager, request: PublishRequest) -> PublishOutcome {
        self.metrics.with(|m| m.record_publish_attempt());
        info!(
            title = %request.title,
            media = request.media.label(),
            tags = request.tags.len(),
            "starting publish workflow"
        );

        let mut trace = vec![WorkflowPhase::Init];
        let lease = match sessions.acquire("publish", CookieScope::Subdomains).await {
            Ok(lease) => lease,
            Err(err) => {
                let failure = PublishFailure::from_browser(WorkflowPhase::Init, err);
                warn!(error = %failure, "could not acquire browser session");
                self.metrics.with(|m| m.record_publish_failure());
                return PublishOutcome::failed(&failure, trace);
            }
        };

        let result = self.run_phases(lease.page(), &request, &mut trace).await;
        if let Err(failure) = &result {
            let phase = trace.last().copied().unwrap_or(WorkflowPhase::Init);
            self.capture_failure(lease.page(), phase, failure).await;
        }

        trace.push(WorkflowPhase::Cleanup);
        lease.release().await;

        match result {
            Ok(Submission::Confirmed { url }) => {
                info!(url = url.as_deref().unwrap_or(""), "publish confirmed");
                self.metrics.with(|m| m.record_publish_confirmed());
                PublishOutcome::confirmed(url, trace)
            }
            Ok(Submission::Unconfirmed) => {
                warn!("publish submitted without confirmation");
                self.metrics.with(|m| m.record_publish_unconfirmed());
                PublishOutcome::unconfirmed(trace)
            }
            Err(failure) => {
                warn!(kind = failure.kind(), error = %failure, "publish failed");
                self.metrics.with(|m| m.record_publish_failure());
                PublishOutcome::failed(&failure, trace)
            }
        }
    }

    async fn run_phases(
        &self,
        page: &dyn PageDriver,
        request: &PublishRequest,
        trace: &mut Vec<WorkflowPhase>,
    ) -> Result<Submission, PublishFailure> {
        self.enter(trace, WorkflowPhase::Navigate, self.navigate(page))
            .await?;
        self.enter(trace, WorkflowPhase::AuthCheck, self.check_auth(page))
            .await?;

        match &request.media {
            MediaAttachment::Video(paths) => {
                self.enter(trace, WorkflowPhase::VideoUpload, self.upload_video(page, paths))
                    .await?;
            }
            MediaAttachment::Images(paths) => {
                self.enter(trace, WorkflowPhase::TabSwitch, self.switch_to_image_tab(page))
                    .await?;
                self.enter(trace, WorkflowPhase::ImageUpload, self.upload_images(page, paths))
                    .await?;
            }
            MediaAttachment::None => {
                self.enter(trace, WorkflowPhase::MediaSkip, self.skip_media())
                    .await?;
            }
        }

        self.enter(trace, WorkflowPhase::FormFill, self.fill_form(page, request))
            .await?;
        if !request.tags.is_empty() {
            self.enter(trace, WorkflowPhase::TagEntry, self.enter_tags(page, &request.tags))
                .await?;
        }
        if let Some(is_private) = request.is_private {
            self.enter(trace, WorkflowPhase::PrivacySet, self.set_privacy(page, is_private))
                .await?;
        }
        self.enter(trace, WorkflowPhase::Submit, self.submit(page))
            .await?;

        trace.push(WorkflowPhase::ResultClassify);
        self.classify(page).await
    }

    async fn enter<F>(
        &self,
        trace: &mut Vec<WorkflowPhase>,
        phase: WorkflowPhase,
        step: F,
    ) -> Result<(), PublishFailure>
    where
        F: Future<Output = BrowserResult<PhaseResult>>,
    {
        trace.push(phase);
        debug!(%phase, "entering publish phase");
        let result = step
            .await
            .unwrap_or_else(|err| PhaseResult::HardFail(PublishFailure::from_browser(phase, err)));
        match result {
            PhaseResult::Continue => Ok(()),
            PhaseResult::SoftFail(reason) => {
                warn!(%phase, %reason, "publish phase degraded, continuing");
                Ok(())
            }
            PhaseResult::HardFail(failure) => Err(failure),
        }
    }

    async fn navigate(&self, page: &dyn PageDriver) -> BrowserResult<PhaseResult> {
        let url = &self.site.publish_url;
        match page.goto(url, ms(self.timeouts.navigation_ms)).await {
            Ok(()) => Ok(PhaseResult::Continue),
            Err(err) => {
                warn!(%url, error = %err, "publish page navigation failed");
                Ok(PhaseResult::HardFail(PublishFailure::NetworkTimeout {
                    url: url.clone(),
                }))
            }
        }
    }

    async fn check_auth(&self, page: &dyn PageDriver) -> BrowserResult<PhaseResult> {
        self.delays.jitter(self.pacing.auth_settle_ms).await;

        match page.current_url().await {
            Ok(url) if url.contains(&self.site.login_path_marker) => {
                return Ok(PhaseResult::HardFail(PublishFailure::AuthRequired(
                    AUTH_MESSAGE.into(),
                )));
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "could not read page url during auth check"),
        }

        let candidates = SelectorCandidate::ranked(
            &self.selectors.login_indicators,
            ms(self.timeouts.login_indicator_ms),
        );
        if let Resolution::Located(found) = self.resolver.resolve(page, &candidates).await {
            info!(indicator = %found.strategy, "login indicator present on publish page");
            return Ok(PhaseResult::HardFail(PublishFailure::AuthRequired(
                AUTH_MESSAGE.into(),
            )));
        }
        Ok(PhaseResult::Continue)
    }

    async fn skip_media(&self) -> BrowserResult<PhaseResult> {
        debug!("no media attached, publishing text only");
        self.delays.jitter(self.pacing.text_only_ms).await;
        Ok(PhaseResult::Continue)
    }

    async fn upload_video(
        &self,
        page: &dyn PageDriver,
        paths: &[PathBuf],
    ) -> BrowserResult<PhaseResult> {
        let phase = WorkflowPhase::VideoUpload;
        self.delays.jitter(self.pacing.media_settle_ms).await;
        if let Some(failure) = self.attach_files(page, phase, paths).await {
            return Ok(PhaseResult::HardFail(failure));
        }
        self.delays.jitter(self.pacing.video_processing_ms).await;

        let preview = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.video_preview.as_str()),
                ms(self.timeouts.video_preview_ms),
            )
            .await;
        if preview.is_found() {
            return Ok(PhaseResult::Continue);
        }
        self.delays.jitter(self.pacing.video_preview_grace_ms).await;
        Ok(PhaseResult::soft("video preview not detected"))
    }

    async fn switch_to_image_tab(&self, page: &dyn PageDriver) -> BrowserResult<PhaseResult> {
        let label = self.site.image_tab_label.as_str();
        self.delays.jitter(self.pacing.media_settle_ms).await;

        let tab = self
            .resolver
            .resolve_one(page, LocateStrategy::text(label), ms(self.timeouts.tab_label_ms))
            .await;
        if let Some(found) = tab.located() {
            match page.activate(&found.selector).await {
                Ok(()) => {
                    debug!(label, "image tab activated");
                    self.delays.jitter(self.pacing.tab_switch_ms).await;
                    return Ok(PhaseResult::Continue);
                }
                Err(err) => debug!(label, error = %err, "synthetic tab click failed"),
            }
        }

        match page.click_text(label).await {
            Ok(()) => {
                debug!(label, "image tab clicked by visible text");
                self.delays.jitter(self.pacing.tab_switch_ms).await;
                Ok(PhaseResult::Continue)
            }
            Err(err) => {
                warn!(label, error = %err, "image tab not reachable");
                Ok(PhaseResult::HardFail(PublishFailure::TabSwitchFailed(
                    label.to_string(),
                )))
            }
        }
    }

    async fn upload_images(
        &self,
        page: &dyn PageDriver,
        paths: &[PathBuf],
    ) -> BrowserResult<PhaseResult> {
        let phase = WorkflowPhase::ImageUpload;
        if let Some(failure) = self.attach_files(page, phase, paths).await {
            return Ok(PhaseResult::HardFail(failure));
        }
        self.delays.jitter(self.pacing.image_processing_ms).await;

        let preview = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.image_preview.as_str()),
                ms(self.timeouts.image_preview_ms),
            )
            .await;
        if preview.is_found() {
            return Ok(PhaseResult::Continue);
        }
        self.delays.jitter(self.pacing.image_preview_grace_ms).await;
        Ok(PhaseResult::soft("image preview not detected"))
    }

    /// Waits for the upload region, then hands `paths` to the file input.
    async fn attach_files(
        &self,
        page: &dyn PageDriver,
        phase: WorkflowPhase,
        paths: &[PathBuf],
    ) -> Option<PublishFailure> {
        let region = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.upload_region.as_str()),
                ms(self.timeouts.upload_region_ms),
            )
            .await;
        if !region.is_found() {
            return Some(PublishFailure::not_found(phase, PageElement::UploadRegion));
        }

        let input = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.file_input.as_str()),
                Duration::ZERO,
            )
            .await;
        let Some(input) = input.located() else {
            return Some(PublishFailure::not_found(phase, PageElement::FileInput));
        };

        info!(%phase, files = paths.len(), "uploading media");
        match page.set_files(&input.selector, paths).await {
            Ok(()) => None,
            Err(err) => Some(PublishFailure::UploadFailure {
                phase,
                reason: err.to_string(),
            }),
        }
    }

    async fn fill_form(
        &self,
        page: &dyn PageDriver,
        request: &PublishRequest,
    ) -> BrowserResult<PhaseResult> {
        let phase = WorkflowPhase::FormFill;
        self.delays.jitter(self.pacing.form_settle_ms).await;
        let window = ms(self.timeouts.field_candidate_ms);

        let title = request.title.as_str();
        let filled = self
            .resolver
            .resolve_with(
                page,
                &SelectorCandidate::ranked(&self.selectors.title, window),
                move |selector| async move { page.fill(&selector, title).await },
            )
            .await;
        if !filled.is_found() {
            return Ok(PhaseResult::HardFail(PublishFailure::not_found(
                phase,
                PageElement::TitleField,
            )));
        }

        let content = request.content.as_str();
        let filled = self
            .resolver
            .resolve_with(
                page,
                &SelectorCandidate::ranked(&self.selectors.content, window),
                move |selector| async move { page.fill(&selector, content).await },
            )
            .await;
        if !filled.is_found() {
            return Ok(PhaseResult::HardFail(PublishFailure::not_found(
                phase,
                PageElement::ContentField,
            )));
        }
        Ok(PhaseResult::Continue)
    }

    /// Never escalates: tag problems leave the note untagged.
    async fn enter_tags(&self, page: &dyn PageDriver, tags: &[String]) -> BrowserResult<PhaseResult> {
        let input = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.tag_input.as_str()),
                Duration::ZERO,
            )
            .await;
        let Some(input) = input.located() else {
            return Ok(PhaseResult::soft("tag input not found"));
        };

        let mut skipped = 0usize;
        for tag in tags {
            let entry = format!("#{tag}");
            let typed = match page.fill(&input.selector, &entry).await {
                Ok(()) => page.press_key(&input.selector, "Enter").await,
                Err(err) => Err(err),
            };
            if let Err(err) = typed {
                warn!(%tag, error = %err, "failed to add tag");
                skipped += 1;
            }
            self.delays.jitter(self.pacing.tag_interval_ms).await;
        }
        if skipped > 0 {
            return Ok(PhaseResult::soft(format!("{skipped} tag(s) not added")));
        }
        Ok(PhaseResult::Continue)
    }

    /// Never escalates: the platform default visibility applies on failure.
    async fn set_privacy(&self, page: &dyn PageDriver, is_private: bool) -> BrowserResult<PhaseResult> {
        let selector = if is_private {
            &self.selectors.privacy_private
        } else {
            &self.selectors.privacy_public
        };
        let control = self
            .resolver
            .resolve_one(page, LocateStrategy::css(selector.as_str()), Duration::ZERO)
            .await;
        let Some(control) = control.located() else {
            return Ok(PhaseResult::soft("visibility control not found"));
        };
        if let Err(err) = page.click(&control.selector).await {
            return Ok(PhaseResult::soft(format!("visibility control click failed: {err}")));
        }
        Ok(PhaseResult::Continue)
    }

    async fn submit(&self, page: &dyn PageDriver) -> BrowserResult<PhaseResult> {
        self.delays.jitter(self.pacing.pre_submit_ms).await;
        let candidates = SelectorCandidate::ranked(
            &self.selectors.publish_button,
            ms(self.timeouts.submit_candidate_ms),
        );
        let clicked = self
            .resolver
            .resolve_with(page, &candidates, move |selector| async move {
                page.click(&selector).await
            })
            .await;
        let Some(button) = clicked.located() else {
            return Ok(PhaseResult::HardFail(PublishFailure::not_found(
                WorkflowPhase::Submit,
                PageElement::PublishButton,
            )));
        };
        info!(button = %button.strategy, "publish clicked");
        self.delays.jitter(self.pacing.post_submit_ms).await;
        Ok(PhaseResult::Continue)
    }

    async fn classify(&self, page: &dyn PageDriver) -> Result<Submission, PublishFailure> {
        let candidates = SelectorCandidate::ranked(
            &self.selectors.success_indicators,
            ms(self.timeouts.result_indicator_ms),
        );
        if let Resolution::Located(found) = self.resolver.resolve(page, &candidates).await {
            debug!(indicator = %found.strategy, "publish success indicator present");
            let url = match page.current_url().await {
                Ok(url) if is_note_permalink(&url) => Some(url),
                Ok(_) => None,
                Err(err) => {
                    debug!(error = %err, "could not read url after publish");
                    None
                }
            };
            return Ok(Submission::Confirmed { url });
        }

        let errors = self
            .resolver
            .resolve_one(
                page,
                LocateStrategy::css(self.selectors.error_indicators.as_str()),
                Duration::ZERO,
            )
            .await;
        if let Some(found) = errors.located() {
            let text = page
                .read_text(&found.selector)
                .await
                .ok()
                .flatten()
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| GENERIC_REJECTION.to_string());
            return Err(PublishFailure::SubmitRejected(text));
        }
        Ok(Submission::Unconfirmed)
    }

    /// Best-effort screenshot of the page state behind a hard failure.
    async fn capture_failure(
        &self,
        page: &dyn PageDriver,
        phase: WorkflowPhase,
        failure: &PublishFailure,
    ) {
        let Some(dir) = self.diagnostics.screenshot_dir.as_deref() else {
            return;
        };
        let dir = Path::new(dir);
        if let Err(err) = fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %err, "cannot create screenshot directory");
            return;
        }
        let path = dir.join(format!(
            "publish-{phase}-{}.png",
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));
        match page.screenshot(&path).await {
            Ok(()) => info!(path = %path.display(), kind = failure.kind(), "saved failure screenshot"),
            Err(err) => warn!(error = %err, "failed to capture failure screenshot"),
        }
    }
}
