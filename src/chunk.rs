//! Greedy file-boundary chunk partitioner.
//!
//! Packs [`FileRecord`]s into [`Chunk`]s whose total character count stays
//! within a budget. Files are never split: a file larger than the budget
//! becomes a chunk of its own rather than being truncated or dropped.
//!
//! The partition is deterministic and order-preserving; concatenating the
//! files of all chunks yields the input sequence.

use crate::models::{Chunk, FileRecord};

/// Split `files` into chunks of at most `budget` characters each.
/// Returns chunks with contiguous indices starting at 0.
pub fn partition(files: Vec<FileRecord>, budget: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<FileRecord> = Vec::new();
    let mut size = 0usize;

    for file in files {
        let len = file.char_len();

        // Close the running chunk if this file would overflow it
        if size + len > budget && !current.is_empty() {
            chunks.push(make_chunk(chunks.len(), std::mem::take(&mut current), size));
            size = 0;
        }

        current.push(file);
        size += len;
    }

    if !current.is_empty() {
        chunks.push(make_chunk(chunks.len(), current, size));
    }

    chunks
}

fn make_chunk(index: usize, files: Vec<FileRecord>, char_size: usize) -> Chunk {
    Chunk {
        index,
        files,
        char_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, len: usize) -> FileRecord {
        FileRecord {
            path: name.to_string(),
            content: "x".repeat(len),
        }
    }

    fn names(chunk: &Chunk) -> Vec<&str> {
        chunk.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_three_files_budget_7000() {
        let files = vec![file("f1", 4000), file("f2", 4000), file("f3", 4000)];
        let chunks = partition(files, 7000);
        // 4000 + 4000 > 7000, so each file after the first would overflow;
        // the partition closes before f2 and before f3.
        assert_eq!(chunks.len(), 3);
        assert_eq!(names(&chunks[0]), vec!["f1"]);
        assert_eq!(names(&chunks[1]), vec!["f2"]);
        assert_eq!(names(&chunks[2]), vec!["f3"]);
    }

    #[test]
    fn test_three_files_budget_8000() {
        let files = vec![file("f1", 4000), file("f2", 4000), file("f3", 4000)];
        let chunks = partition(files, 8000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(names(&chunks[0]), vec!["f1", "f2"]);
        assert_eq!(names(&chunks[1]), vec!["f3"]);
        assert_eq!(chunks[0].char_size, 8000);
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(Vec::new(), 100).is_empty());
    }

    #[test]
    fn test_oversized_file_forms_lone_chunk() {
        let files = vec![file("small", 10), file("huge", 500), file("tail", 10)];
        let chunks = partition(files, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(names(&chunks[1]), vec!["huge"]);
        assert_eq!(chunks[1].char_size, 500);
        assert_eq!(chunks[1].files[0].content.len(), 500);
    }

    #[test]
    fn test_oversized_first_file() {
        let chunks = partition(vec![file("huge", 50), file("a", 5)], 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(names(&chunks[0]), vec!["huge"]);
        assert_eq!(names(&chunks[1]), vec!["a"]);
    }

    #[test]
    fn test_budget_respected_and_nothing_lost() {
        let sizes = [3, 9, 1, 7, 7, 2, 15, 4, 4, 4, 6, 1, 1, 1, 12];
        let files: Vec<FileRecord> = sizes
            .iter()
            .enumerate()
            .map(|(i, n)| file(&format!("f{}", i), *n))
            .collect();
        let budget = 10;
        let chunks = partition(files.clone(), budget);

        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
            assert!(!c.files.is_empty());
            let total: usize = c.files.iter().map(|f| f.char_len()).sum();
            assert_eq!(total, c.char_size);
            assert!(
                total <= budget || c.files.len() == 1,
                "chunk {} over budget with {} files",
                i,
                c.files.len()
            );
        }

        let flattened: Vec<FileRecord> = chunks.into_iter().flat_map(|c| c.files).collect();
        assert_eq!(flattened, files);
    }

    #[test]
    fn test_chunks_are_greedy() {
        // 3 + 3 + 3 fits in 10; the fourth file must start a new chunk.
        let files = vec![file("a", 3), file("b", 3), file("c", 3), file("d", 3)];
        let chunks = partition(files, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(names(&chunks[0]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_budget_counts_characters() {
        let multibyte = FileRecord {
            path: "uni.md".to_string(),
            content: "é".repeat(6),
        };
        let chunks = partition(vec![multibyte, file("b", 4)], 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_size, 10);
    }

    #[test]
    fn test_deterministic() {
        let files: Vec<FileRecord> = (0..20).map(|i| file(&format!("f{}", i), i * 3)).collect();
        assert_eq!(partition(files.clone(), 25), partition(files, 25));
    }
}
