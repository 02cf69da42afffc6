//! Saving task outcomes to a CSV report.

use std::error::Error;
use std::path::Path;

use crate::core::record::TaskRecord;

/// Writes one row per task record, with a header derived from the record
/// fields.
pub fn save_records<P: AsRef<Path>>(records: &[TaskRecord], path: P) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{Task, TaskStatus};
    use crate::core::utilization::FullUtilization;

    #[test]
    fn writes_one_row_per_record() {
        let mut task = Task::new(7, 0, 3, 100., 1, 0, 0, Box::new(FullUtilization));
        task.set_status(TaskStatus::Queued);
        task.set_status(TaskStatus::InExec);
        task.set_status(TaskStatus::Success);
        task.start_time = 0.;
        task.finish_time = 10.;
        let records = vec![TaskRecord::new(&task, Some(1))];

        let path = std::env::temp_dir().join("dcsim_report_test.csv");
        save_records(&records, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("task_id,status,vm_id"));
        assert_eq!(lines.clone().count(), 1);
        assert!(lines.next().unwrap().starts_with("7,Success,3,1,"));
    }
}
