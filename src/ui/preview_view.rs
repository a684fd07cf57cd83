use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use gpui::prelude::FluentBuilder;
use gpui::{
    AnyElement, Context, FocusHandle, InteractiveElement, IntoElement, KeyDownEvent, ObjectFit,
    ParentElement, Render, RenderImage, SharedString, Styled, StyledImage, Window, div, img, px,
};
use gpui_component::{
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use sign_dataset_recorder::{
    operator::command_for_key,
    types::{CaptureStatus, Frame, OperatorCommand, PreviewUpdate},
};

use super::render_util::frame_to_image;

pub(super) struct PreviewView {
    preview_rx: Receiver<PreviewUpdate>,
    command_tx: Sender<OperatorCommand>,
    focus_handle: FocusHandle,
    latest_image: Option<Arc<RenderImage>>,
    status: Option<CaptureStatus>,
    collector_done: bool,
}

impl PreviewView {
    pub(super) fn new(
        preview_rx: Receiver<PreviewUpdate>,
        command_tx: Sender<OperatorCommand>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> Self {
        let focus_handle = cx.focus_handle();
        focus_handle.focus(window);

        Self {
            preview_rx,
            command_tx,
            focus_handle,
            latest_image: None,
            status: None,
            collector_done: false,
        }
    }

    fn drain_updates(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let mut latest_frame: Option<Frame> = None;
        loop {
            match self.preview_rx.try_recv() {
                Ok(update) => {
                    if update.frame.is_some() {
                        latest_frame = update.frame;
                    }
                    self.status = Some(update.status);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.collector_done = true;
                    break;
                }
            }
        }

        if let Some(image) = latest_frame.as_ref().and_then(frame_to_image) {
            self.replace_latest_image(image, window, cx);
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame unless the old texture is dropped.
            cx.drop_image(old_image, Some(window));
        }
    }

    fn send(&self, command: OperatorCommand) {
        if self.command_tx.send(command).is_err() {
            log::warn!("collector stopped listening, dropping {command:?}");
        }
    }

    fn on_key_down(&mut self, event: &KeyDownEvent, _: &mut Window, cx: &mut Context<'_, Self>) {
        if event.is_held {
            return;
        }
        if let Some(command) = command_for_key(&event.keystroke.key) {
            self.send(command);
            cx.stop_propagation();
        }
    }

    fn command_button(
        &self,
        id: &'static str,
        label: &'static str,
        command: OperatorCommand,
        primary: bool,
        cx: &mut Context<'_, Self>,
    ) -> Button {
        let button = Button::new(SharedString::from(id))
            .label(label)
            .on_click(cx.listener(move |this, _, _, _| this.send(command)));
        if primary { button.primary() } else { button.ghost() }
    }

    fn render_controls(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let row = h_flex().gap_2().p_3().justify_center();
        let row = match &self.status {
            Some(CaptureStatus::Waiting { .. }) => row
                .child(self.command_button("record", "Record (Space)", OperatorCommand::Start, true, cx))
                .child(self.command_button("cancel", "Cancel (Q)", OperatorCommand::Cancel, false, cx)),
            Some(CaptureStatus::Recording { .. }) => {
                row.child(self.command_button("cancel", "Cancel (Q)", OperatorCommand::Cancel, false, cx))
            }
            Some(CaptureStatus::AwaitingConfirmation { .. }) => row
                .child(self.command_button("continue", "Continue (S)", OperatorCommand::Continue, true, cx))
                .child(self.command_button("stop", "Next sign (N)", OperatorCommand::Stop, false, cx)),
            Some(CaptureStatus::Finished) | None => row,
        };
        row.into_any_element()
    }
}

impl Render for PreviewView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.drain_updates(window, cx);
        if self.collector_done {
            cx.quit();
        }

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element()
        };

        let (headline, detail, recording) = match &self.status {
            Some(status) => (status.headline(), status.detail(), status.is_recording()),
            None => ("Preparing models...".to_string(), None, false),
        };
        let headline_color = if recording {
            gpui::rgb(0xef4444)
        } else {
            gpui::rgb(0x22c55e)
        };

        let overlay = v_flex()
            .absolute()
            .top(px(12.0))
            .left(px(12.0))
            .gap_1()
            .px_3()
            .py_2()
            .rounded_md()
            .bg(gpui::rgba(0x00000099))
            .child(div().text_lg().text_color(headline_color).child(headline))
            .when_some(detail, |this, detail| {
                this.child(div().text_xs().text_color(gpui::rgb(0xd1d5db)).child(detail))
            });

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .track_focus(&self.focus_handle)
            .on_key_down(cx.listener(Self::on_key_down))
            .child(
                div()
                    .relative()
                    .flex_1()
                    .w_full()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view)
                    .child(overlay),
            )
            .child(self.render_controls(cx))
    }
}
