// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-user cleanup: after a session terminates, kill any residual
//! processes still owned by its OS-user. Skipped for same-account jobs so
//! the worker never terminates itself.

use crate::error::AgentResult;

/// Terminate residual processes owned by `session_os_user`, excluding the
/// worker agent's own account. A no-op when the two accounts coincide.
pub fn cleanup_session_user(session_os_user: &str, agent_os_user: &str) -> AgentResult<()> {
    if session_os_user == agent_os_user {
        return Ok(());
    }
    imp::cleanup(session_os_user)
}

#[cfg(unix)]
mod imp {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use crate::error::{AgentError, AgentResult};

    /// `pkill -eU <user>` run under that user's uid, so the worker agent
    /// needs no elevated privilege over processes outside that account.
    /// Exit code 1 ("no processes matched") is success.
    pub fn cleanup(user: &str) -> AgentResult<()> {
        let uid = nix::unistd::User::from_name(user)
            .map_err(|e| AgentError::Io(std::io::Error::other(e)))?
            .ok_or_else(|| {
                AgentError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such OS user: {user}"),
                ))
            })?
            .uid;

        let status = unsafe {
            Command::new("pkill")
                .args(["-e", "-U", user])
                .uid(uid.as_raw())
                .status()
        }
        .map_err(AgentError::Io)?;

        match status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => Err(AgentError::Io(std::io::Error::other(format!(
                "pkill -eU {user} exited with {status}"
            )))),
        }
    }
}

#[cfg(windows)]
mod imp {
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        GetTokenInformation, LookupAccountSidW, TokenUser, SID_NAME_USE, TOKEN_QUERY, TOKEN_USER,
    };
    use windows::Win32::System::ProcessStatus::EnumProcesses;
    use windows::Win32::System::Threading::{
        OpenProcess, OpenProcessToken, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        PROCESS_TERMINATE,
    };

    use crate::error::{AgentError, AgentResult};

    /// RAII wrapper closing a Win32 `HANDLE` on drop.
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }
    }

    /// Enumerate running processes, terminate any whose token-owning
    /// domain-qualified username matches `user` case-sensitively.
    pub fn cleanup(user: &str) -> AgentResult<()> {
        let pids = enumerate_pids()?;
        for pid in pids {
            if pid == 0 {
                continue;
            }
            if let Some(owner) = process_owner(pid) {
                if owner == user {
                    terminate(pid);
                }
            }
        }
        Ok(())
    }

    fn enumerate_pids() -> AgentResult<Vec<u32>> {
        let mut buffer = vec![0u32; 4096];
        let mut bytes_returned = 0u32;
        unsafe {
            EnumProcesses(buffer.as_mut_ptr(), (buffer.len() * 4) as u32, &mut bytes_returned)
                .map_err(|e| AgentError::Io(std::io::Error::other(e)))?;
        }
        let count = bytes_returned as usize / 4;
        buffer.truncate(count);
        Ok(buffer)
    }

    fn process_owner(pid: u32) -> Option<String> {
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let process = OwnedHandle(process);

            let mut token = HANDLE::default();
            OpenProcessToken(process.0, TOKEN_QUERY, &mut token).ok()?;
            let token = OwnedHandle(token);

            let mut needed = 0u32;
            let _ = GetTokenInformation(token.0, TokenUser, None, 0, &mut needed);
            if needed == 0 {
                return None;
            }
            let mut buf = vec![0u8; needed as usize];
            GetTokenInformation(
                token.0,
                TokenUser,
                Some(buf.as_mut_ptr() as *mut _),
                needed,
                &mut needed,
            )
            .ok()?;
            let token_user = &*(buf.as_ptr() as *const TOKEN_USER);
            sid_to_domain_user(token_user.User.Sid)
        }
    }

    fn sid_to_domain_user(sid: windows::Win32::Foundation::PSID) -> Option<String> {
        unsafe {
            let mut name_len = 0u32;
            let mut domain_len = 0u32;
            let mut use_kind = SID_NAME_USE::default();
            let _ = LookupAccountSidW(
                None,
                sid,
                PWSTR::null(),
                &mut name_len,
                PWSTR::null(),
                &mut domain_len,
                &mut use_kind,
            );
            if name_len == 0 {
                return None;
            }
            let mut name = vec![0u16; name_len as usize];
            let mut domain = vec![0u16; domain_len as usize];
            LookupAccountSidW(
                None,
                sid,
                PWSTR(name.as_mut_ptr()),
                &mut name_len,
                PWSTR(domain.as_mut_ptr()),
                &mut domain_len,
                &mut use_kind,
            )
            .ok()?;
            let name = String::from_utf16_lossy(&name[..name_len as usize]);
            let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
            Some(format!("{domain}\\{name}"))
        }
    }

    fn terminate(pid: u32) {
        unsafe {
            if let Ok(process) = OpenProcess(PROCESS_TERMINATE, false, pid) {
                let process = OwnedHandle(process);
                let _ = TerminateProcess(process.0, 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_account_jobs_skip_cleanup_entirely() {
        // No process is spawned by this test; if cleanup ran it would shell
        // out to `pkill`, so the only observable behavior here is success.
        cleanup_session_user("worker-agent", "worker-agent").expect("same-account is a no-op");
    }
}
