//! ARM EABI syscall number → name table.
//!
//! The original project calls an `arm_syscall_name()` whose source
//! (`syscalls.h`) wasn't included in the retrieval pack, only referenced from
//! `rebuilt_program.c`'s dump routines. This table covers the common POSIX
//! subset of the `arm-linux-gnueabi` syscall ABI (`asm-generic/unistd.h`
//! numbering as exposed on ARM EABI) and falls back to `syscall_<n>` for
//! anything else — the same graceful-fallback shape the function-naming
//! fallback (`f<N>`) uses.

/// Returns the name of the syscall numbered `n`, or a `syscall_<n>` fallback
/// if `n` is negative (unrecoverable) or not in the table.
pub fn name_of(n: i64) -> String {
    if n < 0 {
        return "syscall_unknown".to_string();
    }
    match TABLE.iter().find(|(num, _)| i64::from(*num) == n) {
        Some((_, name)) => name.to_string(),
        None => format!("syscall_{n}"),
    }
}

/// `(number, name)` pairs for the ARM EABI syscall table, restricted to the
/// common POSIX set named in the project's design notes.
const TABLE: &[(u32, &str)] = &[
    (1, "exit"),
    (2, "fork"),
    (3, "read"),
    (4, "write"),
    (5, "open"),
    (6, "close"),
    (7, "waitpid"),
    (9, "link"),
    (10, "unlink"),
    (11, "execve"),
    (12, "chdir"),
    (13, "time"),
    (14, "mknod"),
    (15, "chmod"),
    (19, "lseek"),
    (20, "getpid"),
    (33, "access"),
    (37, "kill"),
    (38, "rename"),
    (39, "mkdir"),
    (40, "rmdir"),
    (41, "dup"),
    (42, "pipe"),
    (45, "brk"),
    (54, "ioctl"),
    (57, "setpgid"),
    (63, "dup2"),
    (64, "getppid"),
    (65, "getpgrp"),
    (78, "gettimeofday"),
    (90, "mmap"),
    (91, "munmap"),
    (114, "wait4"),
    (120, "clone"),
    (122, "uname"),
    (125, "mprotect"),
    (140, "llseek"),
    (141, "getdents"),
    (145, "readv"),
    (146, "writev"),
    (168, "poll"),
    (174, "rt_sigaction"),
    (175, "rt_sigprocmask"),
    (183, "getcwd"),
    (192, "mmap2"),
    (195, "stat64"),
    (196, "lstat64"),
    (197, "fstat64"),
    (224, "gettid"),
    (240, "futex"),
    (252, "exit_group"),
    (263, "clock_gettime"),
    (322, "openat"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_syscall_resolves_by_number() {
        assert_eq!(name_of(1), "exit");
        assert_eq!(name_of(4), "write");
        assert_eq!(name_of(252), "exit_group");
    }

    #[test]
    fn unknown_syscall_falls_back_to_numbered_name() {
        assert_eq!(name_of(999), "syscall_999");
    }

    #[test]
    fn negative_syscall_is_unknown() {
        assert_eq!(name_of(-1), "syscall_unknown");
    }
}
