pub const HELP: &str = r#"
Available debugger commands:

n, next                             -- step over the current statement
s, step                             -- step into a routine called by the current statement
c, continue                         -- continue until the next breakpoint
b, break <line>|<oid>:<line>        -- set a breakpoint at a definition line of the current (or given) routine
d, delete <line>|<oid>:<line>       -- remove a breakpoint
bl, breakpoints                     -- list breakpoints of the session
bt, backtrace                       -- print the remote call stack
l, source <>|<lines>                -- print source around the current line
vars                                -- print local variables of the current frame
args                                -- print arguments of the current frame
where                               -- refresh and print the current position
abort                               -- abort the statement executed by the target
h, help                             -- show help
q, quit                             -- finish the session and exit
"#;
