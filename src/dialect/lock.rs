/// Row-lock strength requested by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    None,
    PessimisticRead,
    PessimisticWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    Wait,
    NoWait,
    SkipLocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub mode: LockMode,
    pub timeout: LockTimeout,
    /// Table aliases for `for update of ...`; empty locks every table.
    pub aliases: Vec<String>,
}

impl LockOptions {
    pub fn write() -> Self {
        Self {
            mode: LockMode::PessimisticWrite,
            timeout: LockTimeout::Wait,
            aliases: Vec::new(),
        }
    }

    pub fn read() -> Self {
        Self {
            mode: LockMode::PessimisticRead,
            ..Self::write()
        }
    }

    pub fn of(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn nowait(mut self) -> Self {
        self.timeout = LockTimeout::NoWait;
        self
    }

    pub fn skip_locked(mut self) -> Self {
        self.timeout = LockTimeout::SkipLocked;
        self
    }
}

/// Which parts of the `for update` family a database understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockingSupport {
    pub for_update_of: bool,
    pub nowait: bool,
    pub skip_locked: bool,
    pub for_share: bool,
}

impl LockingSupport {
    /// Appended to a select; empty when the requested lock cannot be
    /// expressed. Unsupported timeouts degrade to a waiting lock.
    pub fn for_update_string(&self, options: &LockOptions) -> String {
        let mut clause = match options.mode {
            LockMode::None => return String::new(),
            LockMode::PessimisticRead if self.for_share => " for share".to_string(),
            LockMode::PessimisticRead | LockMode::PessimisticWrite => " for update".to_string(),
        };
        if self.for_update_of && !options.aliases.is_empty() {
            clause.push_str(" of ");
            clause.push_str(&options.aliases.join(","));
        }
        match options.timeout {
            LockTimeout::NoWait if self.nowait => clause.push_str(" nowait"),
            LockTimeout::SkipLocked if self.skip_locked => clause.push_str(" skip locked"),
            _ => {}
        }
        clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: LockingSupport = LockingSupport {
        for_update_of: true,
        nowait: true,
        skip_locked: true,
        for_share: true,
    };

    #[test]
    fn test_for_update_of_alias() {
        assert_eq!(
            FULL.for_update_string(&LockOptions::write().of("tableAlias1")),
            " for update of tableAlias1"
        );
        assert_eq!(
            FULL.for_update_string(&LockOptions::read().skip_locked()),
            " for share skip locked"
        );
    }

    #[test]
    fn test_unsupported_parts_are_dropped() {
        let minimal = LockingSupport {
            for_update_of: false,
            nowait: false,
            skip_locked: false,
            for_share: false,
        };
        assert_eq!(
            minimal.for_update_string(&LockOptions::read().of("o").nowait()),
            " for update"
        );
    }
}
