use std::time::Duration;

#[cfg(windows)]
pub fn setup_console() {
    use windows_sys::Win32::System::Console::{
        GetStdHandle, GetConsoleMode, SetConsoleMode, SetConsoleOutputCP,
        STD_OUTPUT_HANDLE, ENABLE_VIRTUAL_TERMINAL_PROCESSING,
    };
    // UTF-8 output so the status emoji render.
    unsafe {
        SetConsoleOutputCP(65001);
        let handle = GetStdHandle(STD_OUTPUT_HANDLE);
        let mut mode = 0;
        if GetConsoleMode(handle, &mut mode) != 0 {
            SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING);
        }
    }
}

#[cfg(not(windows))]
pub fn setup_console() {}

pub fn system_uptime() -> Option<Duration> {
    let data = std::fs::read_to_string("/proc/uptime").ok()?;
    parse_proc_uptime(&data)
}

fn parse_proc_uptime(data: &str) -> Option<Duration> {
    let seconds: f64 = data.split_whitespace().next()?.parse().ok()?;
    Some(Duration::from_secs(seconds as u64))
}

pub fn format_uptime(uptime: Option<Duration>) -> String {
    let Some(uptime) = uptime else {
        return "Unknown".into();
    };
    let total_minutes = uptime.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(None), "Unknown");
        assert_eq!(format_uptime(Some(Duration::from_secs(59))), "0m");
        assert_eq!(format_uptime(Some(Duration::from_secs(3 * 3600 + 7 * 60))), "3h 7m");
        assert_eq!(format_uptime(Some(Duration::from_secs(2 * 86400 + 3600 + 60))), "2d 1h 1m");
    }

    #[test]
    fn parses_proc_uptime() {
        assert_eq!(parse_proc_uptime("350735.47 234388.90\n"), Some(Duration::from_secs(350735)));
        assert_eq!(parse_proc_uptime(""), None);
        assert_eq!(parse_proc_uptime("garbage"), None);
    }
}
