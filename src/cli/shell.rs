//! Interactive session: register, log in, then check balances and send money.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::application::{parse_amount, AuthGateway, Identity, Ledger};
use crate::domain::format_cents;

use super::write_history;

enum Flow {
    Continue,
    Quit,
}

/// Menu-driven session over any line-based input.
/// End of input behaves like choosing "Exit".
pub struct Shell<'a> {
    ledger: &'a Ledger,
    gateway: &'a AuthGateway,
}

impl<'a> Shell<'a> {
    pub fn new(ledger: &'a Ledger, gateway: &'a AuthGateway) -> Self {
        Self { ledger, gateway }
    }

    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        writeln!(out, "Welcome to strongbox.")?;

        loop {
            writeln!(out, "\n1. Register\n2. Login\n3. Reset Password\n4. Exit")?;
            let Some(choice) = ask(&mut lines, out, "Choose an option: ").await? else {
                break;
            };

            let flow = match choice.as_str() {
                "1" => self.register(&mut lines, out).await?,
                "2" => self.login(&mut lines, out).await?,
                "3" => self.reset_password(&mut lines, out).await?,
                "4" => Flow::Quit,
                _ => {
                    writeln!(out, "Invalid option.")?;
                    Flow::Continue
                }
            };
            if let Flow::Quit = flow {
                break;
            }
        }

        writeln!(out, "Goodbye.")?;
        Ok(())
    }

    async fn register<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(username) = ask(lines, out, "Enter new username: ").await? else {
            return Ok(Flow::Quit);
        };
        let Some(password) = ask_secret(lines, out, "Enter new password: ").await? else {
            return Ok(Flow::Quit);
        };

        match self.gateway.register(&username, &password).await {
            Ok(_) => writeln!(
                out,
                "Registration successful. Your starting balance is {} EUR.",
                format_cents(self.gateway.settings().starting_balance)
            )?,
            Err(err) => writeln!(out, "Registration failed: {}", err)?,
        }
        Ok(Flow::Continue)
    }

    async fn login<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(username) = ask(lines, out, "Enter username: ").await? else {
            return Ok(Flow::Quit);
        };
        let Some(password) = ask_secret(lines, out, "Enter password: ").await? else {
            return Ok(Flow::Quit);
        };

        match self.gateway.login(&username, &password).await {
            Ok(identity) => {
                writeln!(out, "Login successful.")?;
                self.session(&identity, lines, out).await
            }
            Err(err) => {
                writeln!(out, "{}", err)?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn reset_password<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(username) = ask(lines, out, "Enter your username: ").await? else {
            return Ok(Flow::Quit);
        };
        let Some(token) = ask(lines, out, "Enter your reset token: ").await? else {
            return Ok(Flow::Quit);
        };
        let Some(new_password) = ask_secret(lines, out, "Enter your new password: ").await? else {
            return Ok(Flow::Quit);
        };

        match self
            .gateway
            .reset_password(&username, &token, &new_password)
            .await
        {
            Ok(()) => writeln!(out, "Password reset successful.")?,
            Err(err) => writeln!(out, "Password reset failed: {}", err)?,
        }
        Ok(Flow::Continue)
    }

    /// Logged-in menu. Returns `Flow::Continue` on logout.
    async fn session<R, W>(&self, identity: &Identity, lines: &mut Lines<R>, out: &mut W) -> Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let username = identity.username();

        loop {
            writeln!(
                out,
                "\n1. View Balance\n2. View Transactions\n3. Transfer Funds\n4. Logout"
            )?;
            let Some(action) = ask(lines, out, "Choose an action: ").await? else {
                return Ok(Flow::Quit);
            };

            match action.as_str() {
                "1" => match self.ledger.get_balance(username).await {
                    Ok(balance) => {
                        writeln!(out, "Your current balance is: {} EUR", format_cents(balance))?
                    }
                    Err(err) => writeln!(out, "{}", err)?,
                },
                "2" => match self.ledger.get_history(username).await {
                    Ok(transactions) => write_history(out, &transactions)?,
                    Err(err) => writeln!(out, "{}", err)?,
                },
                "3" => {
                    let Some(receiver) = ask(lines, out, "Enter recipient username: ").await? else {
                        return Ok(Flow::Quit);
                    };
                    let Some(amount) = ask(lines, out, "Enter amount to transfer: ").await? else {
                        return Ok(Flow::Quit);
                    };

                    let result = match parse_amount(&amount) {
                        Ok(cents) => self.ledger.transfer(username, &receiver, cents).await,
                        Err(err) => Err(err),
                    };
                    match result {
                        Ok(transaction) => writeln!(
                            out,
                            "Transfer successful: {} EUR to {} (transaction #{}).",
                            format_cents(transaction.amount_cents),
                            transaction.receiver,
                            transaction.sequence
                        )?,
                        Err(err) => writeln!(out, "Transfer failed: {}", err)?,
                    }
                }
                "4" => {
                    writeln!(out, "Logged out.")?;
                    return Ok(Flow::Continue);
                }
                _ => writeln!(out, "Invalid option.")?,
            }
        }
    }
}

/// Print a prompt and read one trimmed line. None at end of input.
async fn ask<R, W>(lines: &mut Lines<R>, out: &mut W, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    Ok(ask_secret(lines, out, label).await?.map(|line| line.trim().to_string()))
}

/// Like `ask`, but keeps surrounding whitespace, which is part of a password.
async fn ask_secret<R, W>(lines: &mut Lines<R>, out: &mut W, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", label)?;
    out.flush()?;
    Ok(lines.next_line().await?)
}
