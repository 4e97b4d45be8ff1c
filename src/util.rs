//! Small shared helpers

/// Render a byte count for humans (B/KB/MB/GB/TB)
pub fn human_readable_size(byte_size: u64) -> String {
	if byte_size < 1024 {
		return format!("{}B", byte_size);
	}
	let mut size = byte_size as f64 / 1024.0;
	for unit in ["KB", "MB", "GB"] {
		if size < 1024.0 {
			return format!("{:.2}{}", size, unit);
		}
		size /= 1024.0;
	}
	format!("{:.2}TB", size)
}


// vim: ts=4
