// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Runner for the ntgate entry points
//!
//! This crate provides the CLI interface for driving the privileged entry
//! points from user space: validating caller-supplied strings, running a
//! named event gate scenario, and exercising the case-folding string helpers.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use ntgate_platform_linux::driver_api::{
    self, ntgate_CloseHandle, ntgate_CreateNamedEvent, ntgate_GetBaseNameFromFullPath,
    ntgate_SetNamedEvent, ntgate_StrCmpIW, ntgate_StrStrIW, ntgate_ValidateWideString,
    ntgate_WaitForEvent,
};
use ntgate_shim::status::{NtStatus, nt_success, status_name};
use ntgate_shim::tracing::{
    ApiCategory, FilterRule, TraceConfig, TraceFilter, TraceFormat, TraceOutput, Tracer,
};
use ntgate_shim::wstr::{WCHAR_SIZE, WIDE_NUL, encode_wide};
use std::ffi::{CStr, CString};
use std::sync::{Arc, Barrier};
use std::thread;

/// Default event name for the gate scenario
pub const DEFAULT_GATE_NAME: &str = "\\BaseNamedObjects\\Gate1";

/// Exercise the ntgate boundary-safety entry points
#[derive(Parser, Debug)]
#[command(name = "ntgate", about = "Exercise the ntgate boundary-safety entry points")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable API tracing
    #[arg(long, global = true, default_value = "false")]
    pub trace_apis: bool,

    /// Trace output format (text or json)
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    pub trace_format: String,

    /// Trace output file (default: stderr)
    #[arg(long, global = true)]
    pub trace_output: Option<String>,

    /// Filter traced functions by pattern (e.g., "*NamedEvent")
    #[arg(long, global = true)]
    pub trace_filter: Option<String>,

    /// Filter traced functions by category (validation, synchronization, object_manager, string)
    #[arg(long, global = true)]
    pub trace_category: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate TEXT as a caller-supplied wide string
    Validate(ValidateArgs),

    /// Create a named event, release waiters with a single set, then clean up
    Gate {
        /// Event name
        #[arg(long, default_value = DEFAULT_GATE_NAME)]
        name: String,

        /// Number of waiter threads
        #[arg(long, default_value_t = 1)]
        waiters: usize,
    },

    /// Find PATTERN in HAYSTACK ignoring case
    Search { haystack: String, pattern: String },

    /// Compare two strings ignoring case
    Compare { a: String, b: String },

    /// Print the file name after the last backslash of PATH
    Basename { path: String },
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Text to encode as UTF-16
    pub text: String,

    /// Byte length to claim (default: the whole buffer)
    #[arg(long)]
    pub claimed_bytes: Option<usize>,

    /// Leave off the terminator
    #[arg(long)]
    pub unterminated: bool,

    /// Pass a null pointer instead of the buffer
    #[arg(long)]
    pub null: bool,
}

/// Outcome of `validate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: NtStatus,
    /// Characters before the terminator, when validation succeeded
    pub length: Option<usize>,
}

/// Outcome of `gate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateReport {
    pub waiters_released: usize,
    pub references_acquired: usize,
    pub references_released: usize,
}

fn check(status: NtStatus, what: &str) -> Result<()> {
    if nt_success(status) {
        Ok(())
    } else {
        Err(anyhow!("{what}: 0x{status:08X} ({})", status_name(status)))
    }
}

/// Build the tracer described by the trace flags
pub fn build_tracer(cli_args: &CliArgs) -> Result<Tracer> {
    let mut trace_config = if cli_args.trace_apis {
        TraceConfig::enabled()
    } else {
        TraceConfig::default()
    };

    if cli_args.trace_apis {
        trace_config = match cli_args.trace_format.as_str() {
            "json" => trace_config.with_format(TraceFormat::Json),
            _ => trace_config.with_format(TraceFormat::Text),
        };

        if let Some(output_file) = &cli_args.trace_output {
            trace_config = trace_config.with_output(TraceOutput::File(output_file.into()));
        }
    }

    let mut trace_filter = TraceFilter::new();
    if let Some(pattern) = &cli_args.trace_filter {
        trace_filter = trace_filter.add_rule(FilterRule::Pattern(pattern.clone()));
    }
    if let Some(category_str) = &cli_args.trace_category {
        let category = ApiCategory::from_name(category_str).ok_or_else(|| {
            anyhow!(
                "Unknown category: {category_str}. Valid options: validation, synchronization, object_manager, string"
            )
        })?;
        trace_filter = trace_filter.add_rule(FilterRule::Category(vec![category]));
    }

    Ok(Tracer::new(trace_config, trace_filter)?)
}

/// Run `args.text` through the validating entry point
pub fn validate(args: &ValidateArgs) -> Result<ValidationReport> {
    let mut buffer: Vec<u16> = args.text.encode_utf16().collect();
    if !args.unterminated {
        buffer.push(WIDE_NUL);
    }

    let buffer_bytes = buffer.len() * WCHAR_SIZE;
    let claimed = args.claimed_bytes.unwrap_or(buffer_bytes);
    if claimed > buffer_bytes {
        return Err(anyhow!(
            "Claimed length {claimed} exceeds the {buffer_bytes}-byte buffer"
        ));
    }

    let ptr = if args.null {
        core::ptr::null()
    } else {
        buffer.as_ptr()
    };
    let mut length = 0usize;
    // SAFETY: ptr is null or readable for `claimed` bytes, and length is writable
    let status = unsafe { ntgate_ValidateWideString(ptr, claimed, &raw mut length) };

    Ok(ValidationReport {
        status,
        length: nt_success(status).then_some(length),
    })
}

/// Create `name`, release `waiters` threads with a single set, then reset and
/// close the event
pub fn run_gate(name: &str, waiters: usize) -> Result<GateReport> {
    let manager = driver_api::context().object_manager();
    let acquired_before = manager.references_acquired();
    let released_before = manager.references_released();

    let wide_name = encode_wide(name);
    let mut handle = 0u64;
    // SAFETY: wide_name is terminated and sized, handle is writable
    let status = unsafe {
        ntgate_CreateNamedEvent(
            &raw mut handle,
            wide_name.as_ptr(),
            wide_name.len() * WCHAR_SIZE,
        )
    };
    check(status, "Failed to create named event")?;

    let waiters_released = with_open_event(handle, |handle| release_waiters(handle, waiters))?;

    Ok(GateReport {
        waiters_released,
        references_acquired: manager.references_acquired() - acquired_before,
        references_released: manager.references_released() - released_before,
    })
}

/// Run `body` on `handle`, closing the handle whether or not it succeeds
fn with_open_event<T>(handle: u64, body: impl FnOnce(u64) -> Result<T>) -> Result<T> {
    let result = body(handle);
    let closed = check(ntgate_CloseHandle(handle), "Failed to close handle");
    let value = result?;
    closed?;
    Ok(value)
}

/// Start `waiters` threads blocked on `handle`, signal once, join them and
/// clear the event
fn release_waiters(handle: u64, waiters: usize) -> Result<usize> {
    let barrier = Arc::new(Barrier::new(waiters + 1));
    let threads: Vec<_> = (0..waiters)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ntgate_WaitForEvent(handle)
            })
        })
        .collect();

    barrier.wait();
    check(ntgate_SetNamedEvent(handle, 1), "Failed to set named event")?;

    let mut released = 0;
    for waiter in threads {
        let status = waiter
            .join()
            .map_err(|_| anyhow!("Waiter thread panicked"))?;
        check(status, "Waiter failed")?;
        released += 1;
    }

    check(ntgate_SetNamedEvent(handle, 0), "Failed to reset named event")?;
    Ok(released)
}

/// Position of the first case-insensitive match of `pattern` in `haystack`
pub fn search(haystack: &str, pattern: &str) -> Option<usize> {
    let h = encode_wide(haystack);
    let p = encode_wide(pattern);
    // SAFETY: both are terminated
    let found = unsafe { ntgate_StrStrIW(h.as_ptr(), p.as_ptr()) };
    if found.is_null() {
        return None;
    }
    // SAFETY: found points into h
    let offset = unsafe { found.offset_from(h.as_ptr()) };
    usize::try_from(offset).ok()
}

/// Case-insensitive comparison, negative, zero or positive
pub fn compare(a: &str, b: &str) -> i32 {
    let a = encode_wide(a);
    let b = encode_wide(b);
    // SAFETY: both are terminated
    unsafe { ntgate_StrCmpIW(a.as_ptr(), b.as_ptr()) }
}

/// File name after the last backslash of `path`
pub fn base_name(path: &str) -> Result<Option<String>> {
    let path = CString::new(path)?;
    // SAFETY: path is terminated
    let base = unsafe { ntgate_GetBaseNameFromFullPath(path.as_ptr()) };
    if base.is_null() {
        return Ok(None);
    }
    // SAFETY: base points into path
    let base = unsafe { CStr::from_ptr(base) };
    Ok(Some(base.to_string_lossy().into_owned()))
}

/// Run the command described by `cli_args`
pub fn run(cli_args: CliArgs) -> Result<()> {
    let tracer = build_tracer(&cli_args)?;
    if !driver_api::install(tracer) && cli_args.trace_apis {
        eprintln!("Entry points already initialized; trace flags ignored");
    }

    match cli_args.command {
        Command::Validate(args) => {
            let report = validate(&args)?;
            println!(
                "Status: 0x{:08X} ({})",
                report.status,
                status_name(report.status)
            );
            if let Some(length) = report.length {
                println!("Length: {length}");
            }
        }
        Command::Gate { name, waiters } => {
            let report = run_gate(&name, waiters)?;
            println!("Event: {name}");
            println!("  Waiters released: {}", report.waiters_released);
            println!("  References acquired: {}", report.references_acquired);
            println!("  References released: {}", report.references_released);
        }
        Command::Search { haystack, pattern } => match search(&haystack, &pattern) {
            Some(index) => println!("Found at index {index}"),
            None => println!("Not found"),
        },
        Command::Compare { a, b } => {
            let ordering = compare(&a, &b);
            let relation = match ordering {
                o if o < 0 => "<",
                0 => "==",
                _ => ">",
            };
            println!("{a} {relation} {b} ({ordering})");
        }
        Command::Basename { path } => match base_name(&path)? {
            Some(base) => println!("{base}"),
            None => println!("No separator in {path}"),
        },
    }

    Ok(())
}
