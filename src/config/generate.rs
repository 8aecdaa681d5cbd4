pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# JOURNALD-CWL CONFIGURATION
# =============================================================================
# Ships systemd journal entries to a CloudWatch Logs stream.
#
# Every setting is optional. Without a config file the agent runs with the
# defaults shown below.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/journald-cwl/config.yml
#   3. /etc/journald-cwl/config.yml
#
# Values may reference environment variables with $env{NAME}.

# =============================================================================
# DESTINATION
# =============================================================================

cloudwatch:
  # Log group must already exist
  log_group: journal-logs
  # Created on first delivery if missing. Defaults to the instance id.
  # log_stream: my-host
  # Defaults to the SDK provider chain, then instance metadata
  # region: us-east-1
  # Alternate endpoint (LocalStack and similar)
  # endpoint_url: http://localhost:4566

# Defaults to the EC2 instance id, or the hostname outside EC2
# instance_id: i-0123456789abcdef0

# Last delivered journal cursor. Delete it (or run `cursor reset`) to start over.
state_file: /var/lib/journald-cwl/state

# =============================================================================
# JOURNAL READER
# =============================================================================

reader:
  # How long to wait for new entries before checking for shutdown
  wait_timeout: 1s
  # Where to begin when no checkpoint exists: 'head' (oldest entry) or 'tail'
  start: head
  journalctl_path: journalctl

# =============================================================================
# BATCHING
# =============================================================================

batch:
  # Bytes of message text per request (90% of the 1 MiB service limit)
  max_payload_bytes: 943718
  # Events per request (service ceiling is 10000)
  max_events: 1000
  # Max time an entry waits before its batch is sent
  max_wait: 2s
  # Messages larger than max_payload_bytes are cut to this many bytes
  truncated_message_bytes: 500

# =============================================================================
# DELIVERY
# =============================================================================

writer:
  # Pause before the single retry of a throttled request
  throttle_backoff: 10s

# Max time to flush and deliver the final batch on SIGINT/SIGTERM
shutdown_timeout: 30s
"#
    .to_string()
}
