//! `foldline status`: preview how a tool call shows up while it runs.

use foldline_channels::{
    StatusIndicatorRequest, build_slack_thread_status_payload, resolve_status_indicator_text,
};

pub fn run(
    tool: String,
    template: Option<String>,
    args: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = StatusIndicatorRequest::new(tool);
    request.status_indicator_text = template;
    if let Some(args) = args {
        request = request.with_args_text(args);
    }

    let text = resolve_status_indicator_text(&request);
    let payload = build_slack_thread_status_payload(Some(&text));

    println!("  Status:  {text}");
    println!("  Slack:   {}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
