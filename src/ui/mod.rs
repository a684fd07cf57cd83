use crossbeam_channel::{Receiver, Sender};
use gpui::{App, AppContext, TitlebarOptions, WindowOptions};
use gpui_component::Root;

use sign_dataset_recorder::types::{OperatorCommand, PreviewUpdate};

mod preview_view;
mod render_util;

use preview_view::PreviewView;

/// Opens the preview window. Closing it ends the application.
pub fn launch_ui(
    app: &mut App,
    preview_rx: Receiver<PreviewUpdate>,
    command_tx: Sender<OperatorCommand>,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Sign Dataset Recorder".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.on_window_closed(|cx| cx.quit()).detach();

    app.open_window(window_options, move |window, app| {
        let view = app.new(|cx| PreviewView::new(preview_rx, command_tx, window, cx));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}
